//! Reactive Handles
//!
//! A [`Reactive`] is the interception wrapper around a [`Raw`] composite.
//! Reads through a handle record dependencies; writes classify the mutation
//! and notify. There is at most one handle per `(raw, mode)` in a context,
//! so handles obtained twice for the same raw value compare equal.
//!
//! # Reads
//!
//! 1. Track the key (skipped for read-only handles).
//! 2. Fetch the stored value.
//! 3. Unless shallow, wrap a composite result in a handle of the same
//!    read-only-ness, so nested reads are tracked too.
//!
//! # Writes
//!
//! Read-only handles log a warning and drop the write while still reporting
//! success. Otherwise the old value is captured, the op is classified as
//! `Add` (slot did not exist) or `Set`, the write is applied, and listeners
//! are notified when the value changed. Only the canonical handle for a raw
//! value notifies; handles that outlived [`Reactivity::release`] write
//! silently.
//!
//! Array-specific operations live in `array.rs`, map and set operations in
//! `collection.rs`.
//!
//! [`Reactivity::release`]: super::Reactivity::release

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::warn;

use super::dep::{DepKey, TriggerOp};
use super::runtime::RuntimeInner;
use super::TargetId;
use crate::error::{ReactiveError, Result};
use crate::value::{is_length_key, Raw, RawKind, Value};

/// How a handle treats reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mode {
    /// Only the top level is tracked and wrapped.
    pub shallow: bool,
    /// Writes are rejected and reads are not tracked.
    pub readonly: bool,
}

impl Mode {
    pub const REACTIVE: Mode = Mode {
        shallow: false,
        readonly: false,
    };
    pub const READONLY: Mode = Mode {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_REACTIVE: Mode = Mode {
        shallow: true,
        readonly: false,
    };
    pub const SHALLOW_READONLY: Mode = Mode {
        shallow: true,
        readonly: true,
    };
}

/// Interception handle over a raw composite.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    raw: Raw,
    mode: Mode,
    runtime: Weak<RuntimeInner>,
}

impl Reactive {
    pub(crate) fn new(raw: Raw, mode: Mode, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            inner: Arc::new(HandleInner { raw, mode, runtime }),
        }
    }

    /// The backing composite.
    pub fn raw(&self) -> &Raw {
        &self.inner.raw
    }

    pub fn id(&self) -> TargetId {
        self.inner.raw.id()
    }

    pub fn kind(&self) -> RawKind {
        self.inner.raw.kind()
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.shallow
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn runtime(&self) -> Option<Arc<RuntimeInner>> {
        self.inner.runtime.upgrade()
    }

    pub(crate) fn track(&self, key: DepKey) {
        if self.is_readonly() {
            return;
        }
        if let Some(runtime) = self.runtime() {
            runtime.track(self.id(), key);
        }
    }

    pub(crate) fn trigger(&self, key: DepKey, op: TriggerOp, new_len: Option<usize>) {
        let Some(runtime) = self.runtime() else {
            return;
        };
        if !runtime.is_canonical(self) {
            return;
        }
        runtime.trigger(self.id(), Some(self.kind()), key, op, new_len);
    }

    /// Log and swallow a write against a read-only handle.
    pub(crate) fn reject_write(&self, op: &'static str, key: &Value) {
        warn!(
            op,
            key = %key,
            target_id = self.id().raw(),
            "target is read-only; mutation ignored"
        );
    }

    pub(crate) fn expect_kind(&self, kind: RawKind, op: &'static str) -> Result<()> {
        let actual = self.kind();
        if actual == kind {
            Ok(())
        } else {
            Err(ReactiveError::Unsupported { op, kind: actual })
        }
    }

    /// Wrap a value read through this handle.
    pub(crate) fn wrap_value(&self, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        let mode = Mode {
            shallow: false,
            readonly: self.is_readonly(),
        };
        let Some(runtime) = self.runtime() else {
            return value;
        };
        match value {
            Value::Object(raw) => Value::Reactive(runtime.wrap(&raw, mode)),
            Value::Reactive(handle) if handle.mode() != mode => {
                Value::Reactive(runtime.wrap(handle.raw(), mode))
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    /// Read a field, index, `length`, or (on maps) an entry.
    ///
    /// Missing keys read as [`Value::Undefined`]; sets have no keyed reads.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let kind = self.kind();
        let key = kind.normalize_key(key.into());
        match kind {
            RawKind::Map => self.map_get(key),
            RawKind::Set => Value::Undefined,
            RawKind::Record | RawKind::Array => {
                self.track(DepKey::Prop(key.clone()));
                let value = self.raw().with(|data| data.get(&key));
                self.wrap_value(value)
            }
        }
    }

    /// Write a field, index, `length`, or (on maps) an entry.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let kind = self.kind();
        let key = kind.normalize_key(key.into());
        let value = value.into();

        match kind {
            RawKind::Map => return self.map_set(key, value),
            RawKind::Set => {
                return Err(ReactiveError::Unsupported {
                    op: "set",
                    kind,
                })
            }
            RawKind::Array if is_length_key(&key) => {
                let len = crate::value::array_length(&value)
                    .ok_or_else(|| ReactiveError::InvalidLength(value.to_string()))?;
                return self.set_len(len);
            }
            RawKind::Record | RawKind::Array => {}
        }

        if self.is_readonly() {
            self.reject_write("set", &key);
            return Ok(());
        }

        let (old, op) = self.raw().with_mut(|data| -> Result<(Value, TriggerOp)> {
            let op = if data.has_own(&key) {
                TriggerOp::Set
            } else {
                TriggerOp::Add
            };
            let old = data.get(&key);
            data.put(key.clone(), value.clone())?;
            Ok((old, op))
        })?;

        if old != value {
            self.trigger(DepKey::Prop(key), op, None);
        }
        Ok(())
    }

    /// Remove a field or (on collections) an entry.
    ///
    /// Returns whether something was removed; a rejected read-only delete
    /// reports `true`. Deleting an array element leaves a hole; use `splice`
    /// to close it.
    pub fn delete(&self, key: impl Into<Value>) -> Result<bool> {
        let kind = self.kind();
        let key = kind.normalize_key(key.into());
        if kind.is_collection() {
            return self.collection_delete(key);
        }

        if self.is_readonly() {
            self.reject_write("delete", &key);
            return Ok(true);
        }

        let removed = self.raw().with_mut(|data| data.remove(&key));
        if removed.is_some() {
            self.trigger(DepKey::Prop(key), TriggerOp::Delete, None);
        }
        Ok(removed.is_some())
    }

    /// Whether a field, index or collection key exists.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let kind = self.kind();
        let key = kind.normalize_key(key.into());
        if kind.is_collection() {
            return self.collection_has(key);
        }
        self.track(DepKey::Prop(key.clone()));
        self.raw().with(|data| data.has_own(&key))
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Own keys: field names, indices, map keys, or set elements.
    ///
    /// Records and sets depend on ITERATE, arrays on `length`, maps on
    /// KEY-ITERATE only, so reading a map's keys does not couple to its
    /// values.
    pub fn keys(&self) -> Vec<Value> {
        match self.kind() {
            RawKind::Record => self.track(DepKey::Iterate),
            RawKind::Array => self.track(DepKey::length()),
            RawKind::Map => self.track(DepKey::KeyIterate),
            RawKind::Set => self.track(DepKey::Iterate),
        }
        let keys = self.raw().keys();
        if self.kind().is_collection() {
            keys.into_iter().map(|k| self.wrap_value(k)).collect()
        } else {
            keys
        }
    }

    /// Values in iteration order.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// `(key, value)` pairs in iteration order. Set entries pair each
    /// element with itself.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self.kind() {
            RawKind::Record | RawKind::Array => self
                .keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(key.clone());
                    (key, value)
                })
                .collect(),
            RawKind::Map => {
                self.track(DepKey::Iterate);
                let entries = self.raw().with(|data| match data {
                    crate::value::Composite::Map(entries) => entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>(),
                    _ => Vec::new(),
                });
                entries
                    .into_iter()
                    .map(|(k, v)| (self.wrap_value(k), self.wrap_value(v)))
                    .collect()
            }
            RawKind::Set => {
                self.track(DepKey::Iterate);
                self.raw()
                    .values()
                    .into_iter()
                    .map(|v| {
                        let v = self.wrap_value(v);
                        (v.clone(), v)
                    })
                    .collect()
            }
        }
    }

    /// Array length, collection size, or record field count.
    pub fn len(&self) -> usize {
        match self.kind() {
            RawKind::Array => self.track(DepKey::length()),
            _ => self.track(DepKey::Iterate),
        }
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every `(value, key)` pair.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in self.entries() {
            f(&value, &key);
        }
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target_id", &self.id())
            .field("kind", &self.kind())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Whether the value is an interception handle.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

/// Whether the value is read-only (a read-only handle).
pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Reactive(handle) if handle.is_readonly())
}

/// The backing composite of a handle; any other value is returned as is.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}
