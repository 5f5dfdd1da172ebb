//! Reactivity Runtime
//!
//! The runtime is the context object that connects handles, computations
//! and derived values. One instance is created per application (or per test)
//! and every reactive operation goes through it.
//!
//! # How It Works
//!
//! 1. A computation runs inside a [`ReactiveContext`] frame, which makes it
//!    the "current" computation.
//!
//! 2. Reads through a handle call [`RuntimeInner::track`], which records
//!    `(target, key) -> current` in the dependency store.
//!
//! 3. Writes through a handle call [`RuntimeInner::trigger`], which:
//!    a. collects every computation subscribed to the mutated key (plus the
//!       ITERATE / KEY-ITERATE / length sets the mutation kind implies)
//!    b. drops the computation that is currently executing
//!    c. notifies each remaining one in insertion order: its scheduler if it
//!       has one, an inline rerun otherwise
//!
//! # Threading
//!
//! All state sits behind `parking_lot` locks and no lock is held while user
//! code runs, so the runtime is `Send + Sync`. The computation stack is
//! shared by the whole context, though: a context is meant to be driven
//! from one logical thread (or one task) at a time.
//!
//! [`ReactiveContext`]: super::context::ReactiveContext

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::{ComputationStack, TrackingPause};
use super::dep::{DepKey, DepStore, Mutation, TriggerOp};
use super::handle::{Mode, Reactive};
use super::scheduler::{ManualFlush, PostFlush};
use super::subscriber::Subscriber;
use super::{EffectId, TargetId};
use crate::value::{Raw, RawKind};

/// A deferred unit of work queued by a `flush: post` watcher.
pub type Job = Box<dyn FnOnce() + Send>;

/// A reactivity context.
///
/// Cloning is cheap and every clone refers to the same dependency graph.
///
/// Closures registered as computations should capture handles rather than
/// the context itself: the context owns its computations, so a computation
/// that owns the context keeps both alive until it is stopped.
#[derive(Clone)]
pub struct Reactivity {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    store: Mutex<DepStore>,
    subscribers: Mutex<HashMap<EffectId, Arc<dyn Subscriber>>>,
    pub(crate) stack: ComputationStack,
    handles: DashMap<(TargetId, Mode), Reactive>,
    post_queue: Mutex<VecDeque<Job>>,
    flush_pending: AtomicBool,
    post_flush: Arc<dyn PostFlush>,
}

/// Builder for [`Reactivity`].
pub struct ReactivityBuilder {
    post_flush: Arc<dyn PostFlush>,
}

impl ReactivityBuilder {
    /// Strategy used to drain `flush: post` jobs.
    pub fn post_flush(mut self, strategy: impl PostFlush + 'static) -> Self {
        self.post_flush = Arc::new(strategy);
        self
    }

    pub fn build(self) -> Reactivity {
        Reactivity {
            inner: Arc::new(RuntimeInner {
                store: Mutex::new(DepStore::default()),
                subscribers: Mutex::new(HashMap::new()),
                stack: ComputationStack::default(),
                handles: DashMap::new(),
                post_queue: Mutex::new(VecDeque::new()),
                flush_pending: AtomicBool::new(false),
                post_flush: self.post_flush,
            }),
        }
    }
}

impl Default for ReactivityBuilder {
    fn default() -> Self {
        Self {
            post_flush: Arc::new(ManualFlush),
        }
    }
}

impl Reactivity {
    /// A context whose deferred jobs are drained by [`Reactivity::flush_post`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ReactivityBuilder {
        ReactivityBuilder::default()
    }

    pub(crate) fn inner(&self) -> &Arc<RuntimeInner> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Deep, writable handle.
    pub fn reactive(&self, raw: &Raw) -> Reactive {
        self.inner.wrap(raw, Mode::REACTIVE)
    }

    /// Deep, read-only handle. Reads are not tracked.
    pub fn readonly(&self, raw: &Raw) -> Reactive {
        self.inner.wrap(raw, Mode::READONLY)
    }

    /// Writable handle that tracks and wraps only top-level reads.
    pub fn shallow_reactive(&self, raw: &Raw) -> Reactive {
        self.inner.wrap(raw, Mode::SHALLOW_REACTIVE)
    }

    /// Read-only handle over the top level only.
    pub fn shallow_readonly(&self, raw: &Raw) -> Reactive {
        self.inner.wrap(raw, Mode::SHALLOW_READONLY)
    }

    /// Drop every handle over `raw` and every dependency recorded against
    /// it. Handles obtained earlier keep working on the data but no longer
    /// notify anyone.
    pub fn release(&self, raw: &Raw) {
        self.inner.handles.retain(|(target, _), _| *target != raw.id());
        self.inner.store.lock().remove_target(raw.id());
        debug!(target_id = raw.id().raw(), "released raw value");
    }

    // ------------------------------------------------------------------
    // Tracking control
    // ------------------------------------------------------------------

    /// Suspend dependency recording until the guard is dropped.
    pub fn pause_tracking(&self) -> TrackingPause {
        TrackingPause::new(Arc::clone(&self.inner))
    }

    /// Run `f` without recording any dependency.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = self.pause_tracking();
        f()
    }

    /// The computation currently receiving dependencies.
    pub fn current_effect(&self) -> Option<EffectId> {
        self.inner.stack.current()
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.inner.stack.current().is_some() && self.inner.stack.should_track()
    }

    /// Number of computations subscribed to `(target, key)`.
    pub fn dependent_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.inner.store.lock().subscriber_count(target, key)
    }

    /// Number of live (not stopped) computations.
    pub fn effect_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    // ------------------------------------------------------------------
    // Deferred jobs
    // ------------------------------------------------------------------

    /// Queue a job for the next post flush.
    pub fn queue_post_job(&self, job: Job) {
        self.inner.post_queue.lock().push_back(job);
        if !self.inner.flush_pending.swap(true, Ordering::AcqRel) {
            self.inner.post_flush.request_flush(self.clone());
        }
    }

    /// Run every queued post job in FIFO order, including jobs queued while
    /// flushing. Returns the number of jobs run.
    pub fn flush_post(&self) -> usize {
        self.inner.flush_pending.store(false, Ordering::Release);

        let mut ran = 0;
        loop {
            let job = self.inner.post_queue.lock().pop_front();
            let Some(job) = job else {
                break;
            };
            job();
            ran += 1;
        }

        if ran > 0 {
            debug!(jobs = ran, "flushed post jobs");
        }
        ran
    }

    /// Number of jobs waiting for the next post flush.
    pub fn pending_post_jobs(&self) -> usize {
        self.inner.post_queue.lock().len()
    }
}

impl Default for Reactivity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactivity")
            .field("effects", &self.effect_count())
            .field("handles", &self.inner.handles.len())
            .field("stack_depth", &self.inner.stack.depth())
            .field("pending_post_jobs", &self.pending_post_jobs())
            .finish()
    }
}

impl RuntimeInner {
    /// Return the canonical handle for `(raw, mode)`, creating it if needed.
    pub(crate) fn wrap(self: &Arc<Self>, raw: &Raw, mode: Mode) -> Reactive {
        self.handles
            .entry((raw.id(), mode))
            .or_insert_with(|| Reactive::new(raw.clone(), mode, Arc::downgrade(self)))
            .clone()
    }

    /// Whether `handle` is the registered handle for its raw value.
    pub(crate) fn is_canonical(&self, handle: &Reactive) -> bool {
        self.handles
            .get(&(handle.id(), handle.mode()))
            .is_some_and(|registered| registered.ptr_eq(handle))
    }

    pub(crate) fn register(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.lock().insert(subscriber.id(), subscriber);
    }

    /// Remove a computation from the registry and from every dependency set.
    pub(crate) fn unregister(&self, id: EffectId) {
        self.subscribers.lock().remove(&id);
        self.store.lock().cleanup(id);
    }

    /// Remove a computation from every dependency set it belongs to.
    pub(crate) fn cleanup(&self, id: EffectId) {
        self.store.lock().cleanup(id);
    }

    pub(crate) fn dependency_count(&self, id: EffectId) -> usize {
        self.store.lock().dependency_count(id)
    }

    /// Record that the current computation read `(target, key)`.
    pub(crate) fn track(&self, target: TargetId, key: DepKey) {
        if !self.stack.should_track() {
            return;
        }
        let Some(effect) = self.stack.current() else {
            return;
        };

        self.store.lock().insert(target, key, effect);
    }

    /// Notify every computation affected by a mutation.
    pub(crate) fn trigger(
        &self,
        target: TargetId,
        kind: Option<RawKind>,
        key: DepKey,
        op: TriggerOp,
        new_len: Option<usize>,
    ) {
        let ids = self.store.lock().collect(&Mutation {
            target,
            kind,
            key: &key,
            op,
            new_len,
        });
        if ids.is_empty() {
            return;
        }

        let current = self.stack.current();
        let to_run: Vec<Arc<dyn Subscriber>> = {
            let subscribers = self.subscribers.lock();
            ids.into_iter()
                .filter(|id| Some(*id) != current)
                .filter_map(|id| subscribers.get(&id).cloned())
                .collect()
        };

        trace!(
            target_id = target.raw(),
            key = %key,
            ?op,
            count = to_run.len(),
            "trigger"
        );

        for subscriber in to_run {
            subscriber.notify();
        }
    }
}
