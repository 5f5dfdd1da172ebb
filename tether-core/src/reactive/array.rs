//! Array operations on reactive handles.
//!
//! Searches (`includes`, `index_of`, `last_index_of`) look through the
//! handle first, so every element read is tracked and wrapped elements
//! compare equal to each other, then fall back to the raw storage. Passing a
//! handle or its raw value as the needle gives the same answer.
//!
//! Mutators read `length` internally. They run with tracking paused so the
//! calling computation does not subscribe to the length it is changing and
//! retrigger itself. Every element write still goes through [`Reactive::set`],
//! which classifies it as `Add` or `Set` and notifies as usual.

use super::context::TrackingPause;
use super::dep::{DepKey, TriggerOp};
use super::handle::Reactive;
use crate::error::Result;
use crate::value::{RawKind, Value};

impl Reactive {
    /// Resize the array. Shrinking notifies every index at or past the new
    /// length.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_kind(RawKind::Array, "set_len")?;
        if self.is_readonly() {
            self.reject_write("set", &Value::from("length"));
            return Ok(());
        }

        let old = self.raw().len();
        if old == len {
            return Ok(());
        }
        self.raw()
            .with_mut(|data| data.put(Value::from("length"), Value::from(len)))?;
        self.trigger(DepKey::length(), TriggerOp::Set, Some(len));
        Ok(())
    }

    /// Append values, returning the new length.
    pub fn push<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.expect_kind(RawKind::Array, "push")?;
        let _pause = self.runtime().map(TrackingPause::new);

        for value in values {
            let len = self.raw().len();
            self.set(len, value)?;
        }
        Ok(self.raw().len())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Value> {
        self.expect_kind(RawKind::Array, "pop")?;
        let _pause = self.runtime().map(TrackingPause::new);

        let len = self.raw().len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = self.get(len - 1);
        self.delete(len - 1)?;
        self.set_len(len - 1)?;
        Ok(last)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Value> {
        self.expect_kind(RawKind::Array, "shift")?;
        let _pause = self.runtime().map(TrackingPause::new);

        let mut items = self.raw().values();
        if items.is_empty() {
            return Ok(Value::Undefined);
        }
        let first = self.get(0);
        items.remove(0);
        self.apply_contents(items)?;
        Ok(first)
    }

    /// Prepend values, returning the new length.
    pub fn unshift<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.expect_kind(RawKind::Array, "unshift")?;
        let _pause = self.runtime().map(TrackingPause::new);

        let mut items: Vec<Value> = values.into_iter().map(Into::into).collect();
        items.extend(self.raw().values());
        let len = items.len();
        self.apply_contents(items)?;
        Ok(len)
    }

    /// Remove `delete_count` elements at `start` and insert `items` in their
    /// place. Returns the removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.expect_kind(RawKind::Array, "splice")?;
        let _pause = self.runtime().map(TrackingPause::new);

        let mut contents = self.raw().values();
        let start = start.min(contents.len());
        let end = start.saturating_add(delete_count).min(contents.len());

        let removed: Vec<Value> = contents
            .splice(start..end, items.into_iter().map(Into::into))
            .collect();
        self.apply_contents(contents)?;

        Ok(removed.into_iter().map(|v| self.wrap_value(v)).collect())
    }

    /// Write `contents` index by index, then drop any tail.
    fn apply_contents(&self, contents: Vec<Value>) -> Result<()> {
        let new_len = contents.len();
        for (i, value) in contents.into_iter().enumerate() {
            self.set(i, value)?;
        }
        if self.raw().len() > new_len {
            self.set_len(new_len)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Searches
    // ------------------------------------------------------------------

    /// SameValueZero membership: `NaN` is found.
    pub fn includes(&self, needle: impl Into<Value>) -> Result<bool> {
        self.search(&needle.into(), false, |item, needle| item == needle)
            .map(|found| found.is_some())
    }

    /// Strict-equality position of the first match: `NaN` is never found.
    pub fn index_of(&self, needle: impl Into<Value>) -> Result<Option<usize>> {
        self.search(&needle.into(), false, strict_eq)
    }

    /// Strict-equality position of the last match.
    pub fn last_index_of(&self, needle: impl Into<Value>) -> Result<Option<usize>> {
        self.search(&needle.into(), true, strict_eq)
    }

    fn search(
        &self,
        needle: &Value,
        from_end: bool,
        matches: impl Fn(&Value, &Value) -> bool,
    ) -> Result<Option<usize>> {
        self.expect_kind(RawKind::Array, "search")?;

        let order = |len: usize| -> Box<dyn Iterator<Item = usize>> {
            if from_end {
                Box::new((0..len).rev())
            } else {
                Box::new(0..len)
            }
        };

        let len = self.len();
        if let Some(i) = order(len).find(|i| matches(&self.get(*i), needle)) {
            return Ok(Some(i));
        }

        let raw_needle = needle.to_raw();
        let items = self.raw().values();
        Ok(order(items.len()).find(|i| matches(&items[*i], &raw_needle)))
    }
}

fn is_nan(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_nan())
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    !is_nan(a) && a == b
}
