//! Computation Stack
//!
//! Tracks which computation is currently running so that reads can be
//! attributed to it. The stack lives inside the reactivity context rather
//! than in thread-local storage, so independent contexts never see each
//! other's computations.
//!
//! # Tracking frames
//!
//! Alongside the computation ids we keep a stack of "should track" flags.
//! Entering a computation pushes `true`; [`TrackingPause`] pushes `false`.
//! Array mutators pause tracking because they read `length` internally, and
//! a computation that pushes onto an array must not end up subscribed to the
//! very length it is changing. Entering a nested computation re-enables
//! tracking, so an effect triggered from inside a paused mutator still
//! records its own reads.

use std::sync::Arc;

use parking_lot::Mutex;

use super::runtime::RuntimeInner;
use super::EffectId;

#[derive(Debug, Default)]
struct StackState {
    effects: Vec<EffectId>,
    tracking: Vec<bool>,
}

/// The stack of currently executing computations.
#[derive(Debug, Default)]
pub(crate) struct ComputationStack {
    state: Mutex<StackState>,
}

impl ComputationStack {
    fn push(&self, id: EffectId) {
        let mut state = self.state.lock();
        state.effects.push(id);
        state.tracking.push(true);
    }

    fn pop(&self, id: EffectId) {
        let mut state = self.state.lock();
        let popped = state.effects.pop();
        state.tracking.pop();

        debug_assert_eq!(
            popped,
            Some(id),
            "computation stack mismatch: expected {:?}, got {:?}",
            id,
            popped
        );
    }

    /// The computation receiving newly recorded dependencies, if any.
    pub(crate) fn current(&self) -> Option<EffectId> {
        self.state.lock().effects.last().copied()
    }

    pub(crate) fn depth(&self) -> usize {
        self.state.lock().effects.len()
    }

    pub(crate) fn should_track(&self) -> bool {
        self.state.lock().tracking.last().copied().unwrap_or(true)
    }

    fn pause(&self) {
        self.state.lock().tracking.push(false);
    }

    fn reset(&self) {
        self.state.lock().tracking.pop();
    }
}

/// Guard that keeps a computation on the stack while it runs.
///
/// Popping happens in `Drop`, so the stack stays balanced even when the
/// computation panics.
pub(crate) struct ReactiveContext {
    runtime: Arc<RuntimeInner>,
    id: EffectId,
}

impl ReactiveContext {
    pub(crate) fn enter(runtime: Arc<RuntimeInner>, id: EffectId) -> Self {
        runtime.stack.push(id);
        Self { runtime, id }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        self.runtime.stack.pop(self.id);
    }
}

/// Guard that suspends dependency recording until dropped.
pub struct TrackingPause {
    runtime: Arc<RuntimeInner>,
}

impl TrackingPause {
    pub(crate) fn new(runtime: Arc<RuntimeInner>) -> Self {
        runtime.stack.pause();
        Self { runtime }
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        self.runtime.stack.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Reactivity;

    #[test]
    fn context_tracks_current_computation() {
        let ctx = Reactivity::new();
        let runtime = ctx.inner();
        let id = EffectId::new();

        assert!(runtime.stack.current().is_none());

        {
            let _frame = ReactiveContext::enter(Arc::clone(runtime), id);
            assert_eq!(runtime.stack.current(), Some(id));
            assert_eq!(runtime.stack.depth(), 1);
        }

        assert!(runtime.stack.current().is_none());
        assert_eq!(runtime.stack.depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let ctx = Reactivity::new();
        let runtime = ctx.inner();
        let outer = EffectId::new();
        let inner = EffectId::new();

        {
            let _outer = ReactiveContext::enter(Arc::clone(runtime), outer);
            {
                let _inner = ReactiveContext::enter(Arc::clone(runtime), inner);
                assert_eq!(runtime.stack.current(), Some(inner));
            }
            assert_eq!(runtime.stack.current(), Some(outer));
        }

        assert!(runtime.stack.current().is_none());
    }

    #[test]
    fn pause_is_lifted_by_nested_computation() {
        let ctx = Reactivity::new();
        let runtime = ctx.inner();

        assert!(runtime.stack.should_track());
        let pause = TrackingPause::new(Arc::clone(runtime));
        assert!(!runtime.stack.should_track());
        {
            let _frame = ReactiveContext::enter(Arc::clone(runtime), EffectId::new());
            assert!(runtime.stack.should_track());
        }
        assert!(!runtime.stack.should_track());
        drop(pause);
        assert!(runtime.stack.should_track());
    }
}
