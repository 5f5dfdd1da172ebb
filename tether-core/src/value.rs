//! Value Model
//!
//! The engine observes plain composite values: records, ordered sequences,
//! key-value maps and unique-element sets. A [`Raw`] is such a composite with
//! a stable identity; a [`Value`] is anything that can live inside one.
//!
//! # Equality
//!
//! `Value` equality is SameValueZero: two `NaN`s are equal, `+0` equals `-0`,
//! and composites (raw values, handles, refs, functions) compare by identity.
//! The interception layer only notifies when `old != new`, so this single
//! definition is what keeps a `NaN` field from re-triggering forever.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Reactive, Ref, TargetId};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// A plain, unobserved composite.
    Object(Raw),
    /// An interception handle over a composite.
    Reactive(Reactive),
    /// A single-value reactive cell.
    Ref(Ref),
    Function(Method),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for values that carry their own identity and can be observed.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Raw> {
        match self {
            Value::Object(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_ref_cell(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Method> {
        match self {
            Value::Function(m) => Some(m),
            _ => None,
        }
    }

    /// Truthiness in the usual scripting sense.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Strip an interception handle, returning its backing composite.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Reactive(handle) => Value::Object(handle.raw().clone()),
            other => other.clone(),
        }
    }

    /// The property name this value addresses when used as a record key.
    pub fn property_name(&self) -> Arc<str> {
        match self {
            Value::Str(s) => Arc::clone(s),
            other => Arc::from(other.to_string()),
        }
    }
}

/// Largest array length.
pub const MAX_ARRAY_LEN: u32 = u32::MAX;

/// Interpret a key as an array index, if it is one. Indices stop one short
/// of [`MAX_ARRAY_LEN`].
pub fn array_index(key: &Value) -> Option<usize> {
    whole_number(key).filter(|i| *i < MAX_ARRAY_LEN as usize)
}

/// Interpret a value as an array length, if it is one.
pub fn array_length(value: &Value) -> Option<usize> {
    whole_number(value).filter(|len| *len <= MAX_ARRAY_LEN as usize)
}

fn whole_number(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
            (*n <= f64::from(MAX_ARRAY_LEN)).then(|| *n as usize)
        }
        Value::Str(s) => s
            .parse::<u32>()
            .ok()
            .filter(|i| i.to_string() == **s)
            .map(|i| i as usize),
        _ => None,
    }
}

fn length_of(value: &Value) -> Result<usize> {
    array_length(value).ok_or_else(|| ReactiveError::InvalidLength(value.to_string()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0.0f64.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Object(raw) => raw.id().hash(state),
            Value::Reactive(handle) => handle.addr().hash(state),
            Value::Ref(r) => r.addr().hash(state),
            Value::Function(m) => m.addr().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Object(raw) => write!(f, "[object {}]", raw.kind()),
            Value::Reactive(handle) => write!(f, "[reactive {}]", handle.kind()),
            Value::Ref(_) => f.write_str("[ref]"),
            Value::Function(_) => f.write_str("[function]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(raw) => fmt::Debug::fmt(raw, f),
            Value::Reactive(handle) => fmt::Debug::fmt(handle, f),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
            other => fmt::Display::fmt(other, f),
        }
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Object(raw)
    }
}

impl From<Reactive> for Value {
    fn from(handle: Reactive) -> Self {
        Value::Reactive(handle)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Method> for Value {
    fn from(m: Method) -> Self {
        Value::Function(m)
    }
}

// ----------------------------------------------------------------------------
// Methods
// ----------------------------------------------------------------------------

/// A callable stored inside a composite.
#[derive(Clone)]
pub struct Method(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Method")
    }
}

// ----------------------------------------------------------------------------
// Raw composites
// ----------------------------------------------------------------------------

/// The shape of a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Record,
    Array,
    Map,
    Set,
}

impl RawKind {
    /// Canonical form of a key for this kind of composite.
    ///
    /// Records address fields by name, arrays by numeric index (or the
    /// `length` name), collections by the raw form of the key itself.
    pub fn normalize_key(self, key: Value) -> Value {
        match self {
            RawKind::Record => Value::Str(key.property_name()),
            RawKind::Array => match array_index(&key) {
                Some(i) => Value::Number(i as f64),
                None => Value::Str(key.property_name()),
            },
            RawKind::Map | RawKind::Set => key.to_raw(),
        }
    }

    pub fn is_collection(self) -> bool {
        matches!(self, RawKind::Map | RawKind::Set)
    }
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RawKind::Record => "record",
            RawKind::Array => "array",
            RawKind::Map => "map",
            RawKind::Set => "set",
        })
    }
}

/// Storage of a composite. Keys passed to these methods are expected to be
/// normalized with [`RawKind::normalize_key`].
#[derive(Debug, Clone)]
pub enum Composite {
    Record(IndexMap<Arc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl Composite {
    pub fn kind(&self) -> RawKind {
        match self {
            Composite::Record(_) => RawKind::Record,
            Composite::Array(_) => RawKind::Array,
            Composite::Map(_) => RawKind::Map,
            Composite::Set(_) => RawKind::Set,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Composite::Record(fields) => fields.len(),
            Composite::Array(items) => items.len(),
            Composite::Map(entries) => entries.len(),
            Composite::Set(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value) -> Value {
        match self {
            Composite::Record(fields) => match key {
                Value::Str(name) => fields.get(name).cloned().unwrap_or_default(),
                _ => Value::Undefined,
            },
            Composite::Array(items) => {
                if is_length_key(key) {
                    return Value::from(items.len());
                }
                array_index(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            Composite::Map(entries) => entries.get(key).cloned().unwrap_or_default(),
            Composite::Set(_) => Value::Undefined,
        }
    }

    /// Whether the key names an existing slot. `Undefined` array slots are
    /// holes and do not count.
    pub fn has_own(&self, key: &Value) -> bool {
        match self {
            Composite::Record(fields) => match key {
                Value::Str(name) => fields.contains_key(name),
                _ => false,
            },
            Composite::Array(items) => {
                is_length_key(key)
                    || array_index(key)
                        .and_then(|i| items.get(i))
                        .is_some_and(|item| !item.is_undefined())
            }
            Composite::Map(entries) => entries.contains_key(key),
            Composite::Set(items) => items.contains(key),
        }
    }

    /// Plain write. Array writes past the end fill the gap with `Undefined`.
    pub fn put(&mut self, key: Value, value: Value) -> Result<()> {
        match self {
            Composite::Record(fields) => {
                fields.insert(key.property_name(), value);
            }
            Composite::Array(items) => {
                if is_length_key(&key) {
                    items.resize(length_of(&value)?, Value::Undefined);
                    return Ok(());
                }
                let i = array_index(&key).ok_or_else(|| ReactiveError::InvalidKey {
                    key: key.to_string(),
                    kind: RawKind::Array,
                })?;
                if i >= items.len() {
                    let len = i.checked_add(1).ok_or_else(|| {
                        ReactiveError::InvalidKey {
                            key: key.to_string(),
                            kind: RawKind::Array,
                        }
                    })?;
                    items.resize(len, Value::Undefined);
                }
                items[i] = value;
            }
            Composite::Map(entries) => {
                entries.insert(key, value);
            }
            Composite::Set(_) => {
                return Err(ReactiveError::Unsupported {
                    op: "set",
                    kind: RawKind::Set,
                })
            }
        }
        Ok(())
    }

    /// Plain removal, returning what was removed (nothing for a hole).
    /// Removing an array element leaves a hole rather than shifting.
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        match self {
            Composite::Record(fields) => match key {
                Value::Str(name) => fields.shift_remove(name),
                _ => None,
            },
            Composite::Array(items) => array_index(key)
                .and_then(|i| items.get_mut(i))
                .filter(|item| !item.is_undefined())
                .map(mem::take),
            Composite::Map(entries) => entries.shift_remove(key),
            Composite::Set(items) => items.shift_remove(key).then(|| key.clone()),
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        match self {
            Composite::Record(fields) => fields.keys().map(|k| Value::Str(Arc::clone(k))).collect(),
            Composite::Array(items) => (0..items.len()).map(Value::from).collect(),
            Composite::Map(entries) => entries.keys().cloned().collect(),
            Composite::Set(items) => items.iter().cloned().collect(),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        match self {
            Composite::Record(fields) => fields.values().cloned().collect(),
            Composite::Array(items) => items.clone(),
            Composite::Map(entries) => entries.values().cloned().collect(),
            Composite::Set(items) => items.iter().cloned().collect(),
        }
    }
}

pub(crate) fn is_length_key(key: &Value) -> bool {
    matches!(key, Value::Str(s) if &**s == "length")
}

/// A composite with a stable identity.
///
/// Cloning a `Raw` clones the reference, not the contents. Reads and writes
/// through a `Raw` are never tracked and never notify; go through a
/// [`Reactive`] handle for that.
#[derive(Clone)]
pub struct Raw {
    inner: Arc<RawInner>,
}

struct RawInner {
    id: TargetId,
    ref_cell: bool,
    data: RwLock<Composite>,
}

impl Raw {
    pub fn new(data: Composite) -> Self {
        Self::with_flags(data, false)
    }

    fn with_flags(data: Composite, ref_cell: bool) -> Self {
        Self {
            inner: Arc::new(RawInner {
                id: TargetId::next(),
                ref_cell,
                data: RwLock::new(data),
            }),
        }
    }

    /// An empty composite of the given kind.
    pub fn empty(kind: RawKind) -> Self {
        Self::new(match kind {
            RawKind::Record => Composite::Record(IndexMap::new()),
            RawKind::Array => Composite::Array(Vec::new()),
            RawKind::Map => Composite::Map(IndexMap::new()),
            RawKind::Set => Composite::Set(IndexSet::new()),
        })
    }

    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Arc<str>>,
    {
        Self::new(Composite::Record(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Composite::Array(items.into_iter().collect()))
    }

    pub fn map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Self::new(Composite::Map(
            entries.into_iter().map(|(k, v)| (k.to_raw(), v.to_raw())).collect(),
        ))
    }

    pub fn set_of<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Composite::Set(items.into_iter().map(|v| v.to_raw()).collect()))
    }

    /// The `{ value }` record backing a ref cell.
    pub(crate) fn ref_cell(value: Value) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(Arc::from("value"), value);
        Self::with_flags(Composite::Record(fields), true)
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> RawKind {
        self.inner.data.read().kind()
    }

    /// Whether this composite is the backing record of a ref cell.
    pub fn is_ref_cell(&self) -> bool {
        self.inner.ref_cell
    }

    pub fn ptr_eq(&self, other: &Raw) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the storage under a shared lock.
    pub fn with<R>(&self, f: impl FnOnce(&Composite) -> R) -> R {
        f(&self.inner.data.read())
    }

    /// Mutate the storage under an exclusive lock.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Composite) -> R) -> R {
        f(&mut self.inner.data.write())
    }

    pub fn get(&self, key: impl Into<Value>) -> Value {
        let data = self.inner.data.read();
        let key = data.kind().normalize_key(key.into());
        data.get(&key)
    }

    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let mut data = self.inner.data.write();
        let key = data.kind().normalize_key(key.into());
        data.put(key, value.into())
    }

    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let mut data = self.inner.data.write();
        let key = data.kind().normalize_key(key.into());
        data.remove(&key).is_some()
    }

    pub fn has(&self, key: impl Into<Value>) -> bool {
        let data = self.inner.data.read();
        let key = data.kind().normalize_key(key.into());
        data.has_own(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Value> {
        self.inner.data.read().keys()
    }

    pub fn values(&self) -> Vec<Value> {
        self.inner.data.read().values()
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raw")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nan_equals_nan() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_ne!(Value::from(1), Value::from("1"));
    }

    #[test]
    fn composites_compare_by_identity() {
        let a = Raw::record([("x", Value::from(1))]);
        let b = Raw::record([("x", Value::from(1))]);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn hash_agrees_with_eq() {
        let mut set = HashSet::new();
        set.insert(Value::from(f64::NAN));
        set.insert(Value::from(f64::NAN));
        set.insert(Value::from(0.0));
        set.insert(Value::from(-0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn array_index_parsing() {
        assert_eq!(array_index(&Value::from(3)), Some(3));
        assert_eq!(array_index(&Value::from("3")), Some(3));
        assert_eq!(array_index(&Value::from("03")), None);
        assert_eq!(array_index(&Value::from(-1)), None);
        assert_eq!(array_index(&Value::from(1.5)), None);
        assert_eq!(array_index(&Value::from(4294967294u32)), Some(4294967294));
        assert_eq!(array_index(&Value::from(4294967295u32)), None);
        assert_eq!(array_index(&Value::from(1e300)), None);
        assert_eq!(array_length(&Value::from(4294967295u32)), Some(4294967295));
        assert_eq!(array_length(&Value::from(4294967296.0)), None);
    }

    #[test]
    fn array_rejects_out_of_range_keys() {
        let arr = Raw::array([Value::from(1)]);
        assert!(matches!(
            arr.set(1e300, 2).unwrap_err(),
            ReactiveError::InvalidKey { .. }
        ));
        assert!(matches!(
            arr.set("length", 1e300).unwrap_err(),
            ReactiveError::InvalidLength(_)
        ));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn array_holes_are_not_own_slots() {
        let arr = Raw::array([Value::from("a")]);
        arr.set(2, "c").unwrap();
        assert!(!arr.has(1));
        assert!(arr.has(2));

        assert!(arr.delete(2));
        assert!(!arr.delete(2));
        assert!(!arr.has(2));
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn array_writes_past_end_fill_holes() {
        let arr = Raw::array([Value::from("foo")]);
        arr.set(3, "bar").unwrap();
        assert_eq!(arr.len(), 4);
        assert!(arr.get(1).is_undefined());
        assert_eq!(arr.get("length"), Value::from(4));

        arr.set("length", 1).unwrap();
        assert_eq!(arr.values(), vec![Value::from("foo")]);
    }

    #[test]
    fn array_rejects_named_keys() {
        let arr = Raw::array([]);
        let err = arr.set("foo", 1).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidKey { .. }));
        assert!(matches!(
            arr.set("length", -2).unwrap_err(),
            ReactiveError::InvalidLength(_)
        ));
    }

    #[test]
    fn record_keys_keep_insertion_order() {
        let rec = Raw::record([("b", Value::from(1)), ("a", Value::from(2))]);
        rec.set("c", 3).unwrap();
        assert_eq!(
            rec.keys(),
            vec![Value::from("b"), Value::from("a"), Value::from("c")]
        );
        assert!(rec.delete("a"));
        assert!(!rec.delete("a"));
        assert!(!rec.has("a"));
    }

    #[test]
    fn set_rejects_keyed_writes() {
        let set = Raw::set_of([Value::from(1)]);
        assert!(set.has(1));
        assert!(matches!(
            set.set(2, 2).unwrap_err(),
            ReactiveError::Unsupported { op: "set", .. }
        ));
    }
}
