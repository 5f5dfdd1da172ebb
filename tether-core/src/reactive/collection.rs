//! Map and set operations on reactive handles.
//!
//! Collection entries are reached through method calls rather than field
//! reads, so these operations work on the raw storage directly and do their
//! own tracking:
//!
//! - keyed reads (`get`, `has`) track the key itself
//! - `keys()` on a map tracks KEY-ITERATE, everything else that enumerates
//!   tracks ITERATE
//! - writes classify as `Add` when the key was absent and `Set` when the
//!   stored value changed; removals as `Delete`; `clear` as `Clear`
//!
//! Every mutation of a map or set also notifies KEY-ITERATE readers, even a
//! plain `Set` that cannot change the key list.
//!
//! Keys and values are stored in raw form. Handles passed in are unwrapped,
//! and composites read back out are wrapped again for the reader.

use super::dep::{DepKey, TriggerOp};
use super::handle::Reactive;
use crate::error::{ReactiveError, Result};
use crate::value::{Composite, RawKind, Value};

impl Reactive {
    pub(crate) fn map_get(&self, key: Value) -> Value {
        self.track(DepKey::Prop(key.clone()));
        let value = self.raw().with(|data| data.get(&key));
        self.wrap_value(value)
    }

    pub(crate) fn map_set(&self, key: Value, value: Value) -> Result<()> {
        if self.is_readonly() {
            self.reject_write("set", &key);
            return Ok(());
        }

        let value = value.to_raw();
        let (had, old) = self.raw().with_mut(|data| -> Result<(bool, Value)> {
            let had = data.has_own(&key);
            let old = data.get(&key);
            data.put(key.clone(), value.clone())?;
            Ok((had, old))
        })?;

        if !had {
            self.trigger(DepKey::Prop(key), TriggerOp::Add, None);
        } else if old != value {
            self.trigger(DepKey::Prop(key), TriggerOp::Set, None);
        }
        Ok(())
    }

    pub(crate) fn collection_has(&self, key: Value) -> bool {
        self.track(DepKey::Prop(key.clone()));
        self.raw().with(|data| data.has_own(&key))
    }

    pub(crate) fn collection_delete(&self, key: Value) -> Result<bool> {
        if self.is_readonly() {
            self.reject_write("delete", &key);
            return Ok(true);
        }

        let removed = self.raw().with_mut(|data| data.remove(&key)).is_some();
        if removed {
            self.trigger(DepKey::Prop(key), TriggerOp::Delete, None);
        }
        Ok(removed)
    }

    /// Insert an element into a set. Adding an element that is already
    /// present notifies nobody.
    pub fn add(&self, value: impl Into<Value>) -> Result<()> {
        self.expect_kind(RawKind::Set, "add")?;
        let value = value.into().to_raw();
        if self.is_readonly() {
            self.reject_write("add", &value);
            return Ok(());
        }

        let inserted = self.raw().with_mut(|data| match data {
            Composite::Set(items) => items.insert(value.clone()),
            _ => false,
        });
        if inserted {
            self.trigger(DepKey::Prop(value), TriggerOp::Add, None);
        }
        Ok(())
    }

    /// Remove every entry of a map or set.
    pub fn clear(&self) -> Result<()> {
        let kind = self.kind();
        if !kind.is_collection() {
            return Err(ReactiveError::Unsupported { op: "clear", kind });
        }
        if self.is_readonly() {
            self.reject_write("clear", &Value::Undefined);
            return Ok(());
        }

        let had_entries = self.raw().with_mut(|data| {
            let had = !data.is_empty();
            match data {
                Composite::Map(entries) => entries.clear(),
                Composite::Set(items) => items.clear(),
                _ => {}
            }
            had
        });
        if had_entries {
            self.trigger(DepKey::Iterate, TriggerOp::Clear, None);
        }
        Ok(())
    }
}
