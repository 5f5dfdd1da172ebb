//! Effect Implementation
//!
//! An Effect is a computation that reruns whenever something it read
//! through a reactive handle changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. Every run starts by removing the effect from every dependency set it
//!    belongs to, then pushes it onto the computation stack and runs the
//!    function. Reads made during the run re-subscribe it. A branch that is
//!    no longer taken therefore stops notifying the effect.
//!
//! 3. When a dependency changes, the effect is handed to its scheduler if
//!    it has one, and rerun inline otherwise.
//!
//! # Differences from Computed
//!
//! - Computed values are lazy and cache their result.
//! - Effects are eager; their return value goes to whoever calls `run`.
//!
//! # Stopping
//!
//! [`Effect::stop`] removes the effect from the graph for good and fires
//! its `on_stop` hook once. A stopped effect can still be run by hand, but
//! it no longer tracks anything and is never notified again.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::runtime::RuntimeInner;
use super::subscriber::Subscriber;
use super::{EffectId, Reactivity};

/// Scheduler invoked instead of an inline rerun.
pub type SchedulerFn<T> = Arc<dyn Fn(&Effect<T>) + Send + Sync>;

type StopHook = Box<dyn FnOnce() + Send>;

/// Options for [`Reactivity::effect_with`].
pub struct EffectOptions<T = ()> {
    lazy: bool,
    scheduler: Option<SchedulerFn<T>>,
    on_stop: Option<StopHook>,
}

impl<T> EffectOptions<T> {
    pub fn new() -> Self {
        Self {
            lazy: false,
            scheduler: None,
            on_stop: None,
        }
    }

    /// Do not run on registration; the first run is up to the caller.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Receive the effect on every notification instead of rerunning it.
    pub fn scheduler(mut self, scheduler: impl Fn(&Effect<T>) + Send + Sync + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Called once when the effect is stopped.
    pub fn on_stop(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(hook));
        self
    }
}

impl<T> Default for EffectOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered computation.
///
/// Cloning shares the same computation. Dropping every clone does *not*
/// stop it: the context keeps it alive until [`Effect::stop`] is called.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = Reactivity::new();
/// let state = ctx.reactive(&Raw::record([("count", Value::from(0))]));
///
/// let reader = state.clone();
/// let effect = ctx.effect(move || {
///     println!("count is {}", reader.get("count"));
/// });
///
/// state.set("count", 5)?; // prints "count is 5"
/// effect.stop();
/// ```
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

struct EffectInner<T> {
    id: EffectId,
    runtime: Weak<RuntimeInner>,
    run: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<SchedulerFn<T>>,
    on_stop: Mutex<Option<StopHook>>,
    active: AtomicBool,
    run_count: AtomicUsize,
}

impl<T: 'static> Effect<T> {
    pub(crate) fn new<F>(ctx: &Reactivity, f: F, options: EffectOptions<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: EffectId::new(),
            runtime: ctx.downgrade(),
            run: Box::new(f),
            scheduler: options.scheduler,
            on_stop: Mutex::new(options.on_stop),
            active: AtomicBool::new(true),
            run_count: AtomicUsize::new(0),
        });
        ctx.inner().register(Arc::clone(&inner) as Arc<dyn Subscriber>);

        let effect = Self { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Run the function, re-collecting dependencies, and return its result.
    pub fn run(&self) -> T {
        let inner = &self.inner;
        inner.run_count.fetch_add(1, Ordering::Relaxed);

        let runtime = match inner.runtime.upgrade() {
            Some(runtime) if inner.active.load(Ordering::Acquire) => runtime,
            _ => return (inner.run)(),
        };

        runtime.cleanup(inner.id);
        let _frame = ReactiveContext::enter(runtime, inner.id);
        trace!(effect_id = inner.id.raw(), "running effect");
        (inner.run)()
    }
}

impl<T> Effect<T> {
    /// Permanently detach from the dependency graph.
    pub fn stop(&self) {
        self.inner.shutdown();
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// How many times the function has been called, manual runs included.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Number of `(target, key)` sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map_or(0, |runtime| runtime.dependency_count(self.inner.id))
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn notify(self: Arc<Self>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        match self.scheduler.clone() {
            Some(scheduler) => scheduler(&Effect { inner: self }),
            None => {
                Effect { inner: self }.run();
            }
        }
    }
}

impl<T> EffectInner<T> {
    fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.unregister(self.id);
        }
        let hook = self.on_stop.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        debug!(effect_id = self.id.raw(), "effect stopped");
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Reactivity {
    /// Register a computation and run it once.
    pub fn effect<T, F>(&self, f: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Effect::new(self, f, EffectOptions::default())
    }

    /// Register a computation with options.
    pub fn effect_with<T, F>(&self, f: F, options: EffectOptions<T>) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Effect::new(self, f, options)
    }

    /// Stop a computation. Same as [`Effect::stop`].
    pub fn stop<T>(&self, effect: &Effect<T>) {
        effect.stop();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
