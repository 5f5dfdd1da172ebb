//! Identifiers and the subscriber contract.
//!
//! A subscriber is any computation that can sit in a dependency set. The
//! dependency store only ever holds [`EffectId`]s; the runtime resolves an id
//! back to its subscriber through a registry when a trigger fires. Targets
//! (raw composites, computed values) are addressed by [`TargetId`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a computation.
///
/// Ids are drawn from a process-wide counter, so they stay unique even across
/// independent [`Reactivity`](super::Reactivity) contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of something that can be read-tracked: a raw composite or a
/// derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A computation the runtime can notify.
pub(crate) trait Subscriber: Send + Sync {
    fn id(&self) -> EffectId;

    /// A dependency changed: rerun inline or hand off to the scheduler.
    fn notify(self: Arc<Self>);
}
