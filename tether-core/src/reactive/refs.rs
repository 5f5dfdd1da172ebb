//! Refs and Auto-Unwrapping
//!
//! A [`Ref`] is a single reactive cell read and written through `get`/`set`.
//! Three kinds exist:
//!
//! - a cell created by [`Reactivity::make_ref`]: a reactive `{ value }`
//!   record flagged as a ref cell, so reading it tracks its `value` key
//! - a field alias created by [`Reactivity::to_ref`], which forwards to one
//!   key of a reactive handle
//! - a computed value converted with `Ref::from`, which is read-only
//!
//! [`AutoUnwrap`] is the view produced by [`Reactivity::proxy_refs`]. Reading
//! a field that holds a ref returns the ref's value, and writing such a
//! field writes into the ref instead of replacing it. Consuming code can
//! treat ref-valued fields as plain values.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::computed::Computed;
use super::handle::Reactive;
use super::Reactivity;
use crate::error::{ReactiveError, Result};
use crate::value::{Raw, RawKind, Value};

/// A single-value reactive cell.
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefKind>,
}

enum RefKind {
    Cell(Reactive),
    Field { target: Reactive, key: Value },
    Computed(Computed<Value>),
}

impl Ref {
    fn from_kind(kind: RefKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    /// Tracked read of the current value.
    pub fn get(&self) -> Value {
        match &*self.inner {
            RefKind::Cell(cell) => cell.get("value"),
            RefKind::Field { target, key } => target.get(key.clone()),
            RefKind::Computed(computed) => computed.get(),
        }
    }

    /// Write a new value, notifying readers if it changed.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match &*self.inner {
            RefKind::Cell(cell) => cell.set("value", value),
            RefKind::Field { target, key } => target.set(key.clone(), value),
            RefKind::Computed(computed) => {
                warn!(
                    target_id = computed.id().raw(),
                    "computed value is read-only; write ignored"
                );
                Ok(())
            }
        }
    }

    pub fn is_readonly(&self) -> bool {
        match &*self.inner {
            RefKind::Cell(cell) => cell.is_readonly(),
            RefKind::Field { target, .. } => target.is_readonly(),
            RefKind::Computed(_) => true,
        }
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl From<Computed<Value>> for Ref {
    fn from(computed: Computed<Value>) -> Self {
        Ref::from_kind(RefKind::Computed(computed))
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Ref {}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            RefKind::Cell(cell) => f.debug_tuple("Ref").field(&cell.id()).finish(),
            RefKind::Field { target, key } => f
                .debug_struct("Ref")
                .field("target_id", &target.id())
                .field("key", key)
                .finish(),
            RefKind::Computed(computed) => f.debug_tuple("Ref").field(computed).finish(),
        }
    }
}

/// Whether the value is a ref, or a handle over a ref cell.
pub fn is_ref(value: &Value) -> bool {
    match value {
        Value::Ref(_) => true,
        Value::Reactive(handle) => handle.raw().is_ref_cell(),
        _ => false,
    }
}

/// The value behind a ref; anything else is returned unchanged.
pub fn unref(value: Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        Value::Reactive(handle) if handle.raw().is_ref_cell() => handle.get("value"),
        other => other,
    }
}

// ----------------------------------------------------------------------------
// Auto-unwrapping view
// ----------------------------------------------------------------------------

/// A view over a composite that unwraps ref-valued fields.
///
/// Reads through a reactive target are tracked; reads through a plain
/// composite only track what the refs themselves track.
#[derive(Clone, PartialEq, Eq)]
pub struct AutoUnwrap {
    target: Value,
}

impl AutoUnwrap {
    /// The wrapped composite: a handle or a plain raw value.
    pub fn target(&self) -> &Value {
        &self.target
    }

    /// Read a field, unwrapping it if it holds a ref.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        unref(self.get_stored(key))
    }

    /// Read a field as stored, without unwrapping.
    pub fn get_stored(&self, key: impl Into<Value>) -> Value {
        match &self.target {
            Value::Reactive(handle) => handle.get(key),
            Value::Object(raw) => raw.get(key),
            _ => Value::Undefined,
        }
    }

    /// Write a field. If the field currently holds a ref, the ref is
    /// written instead.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let current = self.get_stored(key.clone());
        if let Value::Ref(r) = &current {
            return r.set(value);
        }
        if let Value::Reactive(handle) = &current {
            if handle.raw().is_ref_cell() {
                return handle.set("value", value);
            }
        }

        match &self.target {
            Value::Reactive(handle) => handle.set(key, value),
            Value::Object(raw) => raw.set(key, value),
            _ => Err(ReactiveError::NotComposite),
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        match &self.target {
            Value::Reactive(handle) => handle.keys(),
            Value::Object(raw) => raw.keys(),
            _ => Vec::new(),
        }
    }

    /// `(key, unwrapped value)` pairs.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone());
                (key, value)
            })
            .collect()
    }
}

impl fmt::Debug for AutoUnwrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AutoUnwrap").field(&self.target).finish()
    }
}

impl Reactivity {
    /// A new reactive cell holding `value`.
    pub fn make_ref(&self, value: impl Into<Value>) -> Ref {
        let cell = self.reactive(&Raw::ref_cell(value.into()));
        Ref::from_kind(RefKind::Cell(cell))
    }

    /// A ref that reads and writes `target[key]`.
    pub fn to_ref(&self, target: &Reactive, key: impl Into<Value>) -> Ref {
        Ref::from_kind(RefKind::Field {
            target: target.clone(),
            key: key.into(),
        })
    }

    /// A plain record (or array) holding a field ref for every own key of
    /// `target`. Spreading a reactive value this way keeps every field live.
    pub fn to_refs(&self, target: &Reactive) -> Result<Raw> {
        let kind = target.kind();
        let refs = target
            .keys()
            .into_iter()
            .map(|key| (key.clone(), Value::Ref(self.to_ref(target, key))));

        match kind {
            RawKind::Record => Ok(Raw::record(refs.map(|(k, v)| (k.property_name(), v)))),
            RawKind::Array => Ok(Raw::array(refs.map(|(_, v)| v))),
            RawKind::Map | RawKind::Set => Err(ReactiveError::Unsupported {
                op: "to_refs",
                kind,
            }),
        }
    }

    /// An auto-unwrapping view over a composite.
    pub fn proxy_refs(&self, target: impl Into<Value>) -> Result<AutoUnwrap> {
        let target = target.into();
        if !target.is_composite() {
            return Err(ReactiveError::NotComposite);
        }
        Ok(AutoUnwrap { target })
    }
}
