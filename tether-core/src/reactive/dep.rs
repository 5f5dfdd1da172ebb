//! Dependency Store
//!
//! Maps a target to its per-key dependency sets, and each computation to the
//! slots it currently occupies. Both directions are plain ids, so cleanup is
//! O(number of slots) and nothing here forms a reference cycle.
//!
//! # Notification rules
//!
//! | op       | also notifies                                              |
//! |----------|------------------------------------------------------------|
//! | `Set`    | nothing extra (maps: ITERATE, values changed)              |
//! | `Add`    | ITERATE; arrays also `length`                              |
//! | `Delete` | ITERATE                                                    |
//! | `Clear`  | every set on the target                                    |
//!
//! Writing an array's `length` additionally notifies every index at or past
//! the new length. Any mutation of a map or set notifies KEY-ITERATE.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::{EffectId, TargetId};
use crate::value::{array_index, RawKind, Value};

/// A key a computation can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A concrete field, index or collection key (normalized).
    Prop(Value),
    /// The shape of the target: enumeration, size.
    Iterate,
    /// Key-only enumeration of a map.
    KeyIterate,
}

impl DepKey {
    pub fn prop(key: impl Into<Value>) -> Self {
        DepKey::Prop(key.into())
    }

    pub(crate) fn length() -> Self {
        DepKey::Prop(Value::from("length"))
    }

    pub(crate) fn value() -> Self {
        DepKey::Prop(Value::from("value"))
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Prop(key) => write!(f, "{key}"),
            DepKey::Iterate => f.write_str("<iterate>"),
            DepKey::KeyIterate => f.write_str("<key-iterate>"),
        }
    }
}

/// Classification of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// One membership of a computation: `(target, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DepSlot {
    target: TargetId,
    key: DepKey,
}

/// Description of a mutation handed to [`DepStore::collect`].
#[derive(Debug, Clone)]
pub(crate) struct Mutation<'a> {
    pub target: TargetId,
    /// `None` for derived values.
    pub kind: Option<RawKind>,
    pub key: &'a DepKey,
    pub op: TriggerOp,
    /// The new length, when an array's `length` was written.
    pub new_len: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct DepStore {
    targets: HashMap<TargetId, HashMap<DepKey, IndexSet<EffectId>>>,
    slots: HashMap<EffectId, SmallVec<[DepSlot; 4]>>,
}

impl DepStore {
    /// Subscribe `effect` to `(target, key)`.
    pub(crate) fn insert(&mut self, target: TargetId, key: DepKey, effect: EffectId) -> bool {
        let set = self
            .targets
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_default();

        if !set.insert(effect) {
            return false;
        }

        self.slots
            .entry(effect)
            .or_default()
            .push(DepSlot { target, key });
        true
    }

    /// Remove `effect` from every set it belongs to.
    pub(crate) fn cleanup(&mut self, effect: EffectId) {
        let Some(slots) = self.slots.remove(&effect) else {
            return;
        };

        for slot in slots {
            if let Some(keys) = self.targets.get_mut(&slot.target) {
                if let Some(set) = keys.get_mut(&slot.key) {
                    set.shift_remove(&effect);
                    if set.is_empty() {
                        keys.remove(&slot.key);
                    }
                }
                if keys.is_empty() {
                    self.targets.remove(&slot.target);
                }
            }
        }
    }

    /// Forget a target entirely.
    pub(crate) fn remove_target(&mut self, target: TargetId) {
        if self.targets.remove(&target).is_none() {
            return;
        }
        for slots in self.slots.values_mut() {
            slots.retain(|slot| slot.target != target);
        }
    }

    /// Computations to notify for a mutation, in insertion order.
    pub(crate) fn collect(&self, mutation: &Mutation<'_>) -> IndexSet<EffectId> {
        let mut out = IndexSet::new();
        let Some(keys) = self.targets.get(&mutation.target) else {
            return out;
        };

        let mut add = |key: &DepKey| {
            if let Some(set) = keys.get(key) {
                out.extend(set.iter().copied());
            }
        };

        if mutation.op == TriggerOp::Clear {
            for key in keys.keys() {
                add(key);
            }
            return out;
        }

        add(mutation.key);

        let kind = mutation.kind;
        match mutation.op {
            TriggerOp::Add => {
                add(&DepKey::Iterate);
                if kind == Some(RawKind::Array) {
                    add(&DepKey::length());
                }
            }
            TriggerOp::Delete => add(&DepKey::Iterate),
            TriggerOp::Set if kind == Some(RawKind::Map) => add(&DepKey::Iterate),
            _ => {}
        }

        if kind.is_some_and(RawKind::is_collection) {
            add(&DepKey::KeyIterate);
        }

        if let Some(new_len) = mutation.new_len {
            for (key, set) in keys {
                if let DepKey::Prop(prop) = key {
                    if array_index(prop).is_some_and(|i| i >= new_len) {
                        out.extend(set.iter().copied());
                    }
                }
            }
        }

        out
    }

    /// Number of computations subscribed to `(target, key)`.
    pub(crate) fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.targets
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map_or(0, |set| set.len())
    }

    /// Number of slots a computation currently occupies.
    pub(crate) fn dependency_count(&self, effect: EffectId) -> usize {
        self.slots.get(&effect).map_or(0, |slots| slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation(target: TargetId, kind: RawKind, key: &DepKey, op: TriggerOp) -> Mutation<'_> {
        Mutation {
            target,
            kind: Some(kind),
            key,
            op,
            new_len: None,
        }
    }

    #[test]
    fn insert_and_cleanup() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let effect = EffectId::new();

        assert!(store.insert(target, DepKey::prop("a"), effect));
        assert!(!store.insert(target, DepKey::prop("a"), effect));
        assert!(store.insert(target, DepKey::prop("b"), effect));
        assert_eq!(store.dependency_count(effect), 2);

        store.cleanup(effect);
        assert_eq!(store.dependency_count(effect), 0);
        assert_eq!(store.subscriber_count(target, &DepKey::prop("a")), 0);
    }

    #[test]
    fn set_notifies_only_the_key() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let reader = EffectId::new();
        let iterator = EffectId::new();
        store.insert(target, DepKey::prop("a"), reader);
        store.insert(target, DepKey::Iterate, iterator);

        let key = DepKey::prop("a");
        let hit = store.collect(&mutation(target, RawKind::Record, &key, TriggerOp::Set));
        assert_eq!(hit.into_iter().collect::<Vec<_>>(), vec![reader]);

        let hit = store.collect(&mutation(target, RawKind::Record, &key, TriggerOp::Add));
        assert_eq!(hit.into_iter().collect::<Vec<_>>(), vec![reader, iterator]);
    }

    #[test]
    fn array_add_notifies_length() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let effect = EffectId::new();
        store.insert(target, DepKey::length(), effect);

        let key = DepKey::prop(3);
        let hit = store.collect(&mutation(target, RawKind::Array, &key, TriggerOp::Add));
        assert!(hit.contains(&effect));
    }

    #[test]
    fn truncation_notifies_indices_past_new_length() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let first = EffectId::new();
        let third = EffectId::new();
        store.insert(target, DepKey::prop(0), first);
        store.insert(target, DepKey::prop(2), third);

        let key = DepKey::length();
        let hit = store.collect(&Mutation {
            new_len: Some(1),
            ..mutation(target, RawKind::Array, &key, TriggerOp::Set)
        });
        assert!(!hit.contains(&first));
        assert!(hit.contains(&third));
    }

    #[test]
    fn collection_mutations_notify_key_iteration() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let keys_reader = EffectId::new();
        store.insert(target, DepKey::KeyIterate, keys_reader);

        let key = DepKey::prop("k");
        let hit = store.collect(&mutation(target, RawKind::Map, &key, TriggerOp::Set));
        assert!(hit.contains(&keys_reader));

        let hit = store.collect(&mutation(target, RawKind::Record, &key, TriggerOp::Add));
        assert!(!hit.contains(&keys_reader));
    }

    #[test]
    fn remove_target_drops_slots() {
        let mut store = DepStore::default();
        let target = TargetId::next();
        let effect = EffectId::new();
        store.insert(target, DepKey::prop("a"), effect);

        store.remove_target(target);
        assert_eq!(store.dependency_count(effect), 0);
    }
}
