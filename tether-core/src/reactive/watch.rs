//! Watch Implementation
//!
//! A watcher runs a callback with the new and previous result of a source
//! whenever something the source read changes.
//!
//! # How Watchers Work
//!
//! 1. The source is wrapped in a lazy effect. A getter source is called as
//!    is; a deep source is traversed (every reachable field read, cycles
//!    skipped) purely so every field becomes a dependency.
//!
//! 2. The effect's scheduler runs a job instead of rerunning the effect:
//!    a. rerun the effect to get the new value
//!    b. fire the invalidation hook registered by the previous callback
//!    c. call the callback with `(new, old, on_invalidate)`
//!    d. keep the new value as the next old value
//!
//! 3. With `Flush::Post` the job is queued on the context's post queue
//!    instead of running inside the triggering write. `Pre` and `Sync`
//!    both run it inline.
//!
//! 4. With `immediate` the job runs once at registration (old value
//!    `None`). Otherwise the source is evaluated once to record the first
//!    old value and the callback waits for a change.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectOptions};
use super::handle::Reactive;
use super::refs::{AutoUnwrap, Ref};
use super::{Reactivity, TargetId};
use crate::value::{Raw, Value};

/// When a watcher's job runs relative to the write that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    /// Same as `Sync`; no pre-render phase exists.
    #[default]
    Pre,
    /// Deferred to the next post flush.
    Post,
    /// Inline, inside the triggering write.
    Sync,
}

/// Options for [`Reactivity::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the callback once at registration.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }
}

// ----------------------------------------------------------------------------
// Deep traversal
// ----------------------------------------------------------------------------

/// Values that can be read in full so every field becomes a dependency.
pub trait Traverse {
    /// Read everything reachable. `seen` holds the composites already
    /// visited.
    fn traverse(&self, seen: &mut HashSet<TargetId>);
}

impl Traverse for Value {
    fn traverse(&self, seen: &mut HashSet<TargetId>) {
        match self {
            Value::Reactive(handle) => handle.traverse(seen),
            Value::Object(raw) => raw.traverse(seen),
            Value::Ref(r) => r.traverse(seen),
            _ => {}
        }
    }
}

impl Traverse for Reactive {
    fn traverse(&self, seen: &mut HashSet<TargetId>) {
        if !seen.insert(self.id()) {
            return;
        }
        for value in self.values() {
            value.traverse(seen);
        }
    }
}

// Plain composites are not tracked themselves but may hold refs or handles.
impl Traverse for Raw {
    fn traverse(&self, seen: &mut HashSet<TargetId>) {
        if !seen.insert(self.id()) {
            return;
        }
        for value in self.values() {
            value.traverse(seen);
        }
    }
}

impl Traverse for Ref {
    fn traverse(&self, seen: &mut HashSet<TargetId>) {
        self.get().traverse(seen);
    }
}

impl Traverse for AutoUnwrap {
    fn traverse(&self, seen: &mut HashSet<TargetId>) {
        for (_, value) in self.entries() {
            value.traverse(seen);
        }
    }
}

/// What a watcher observes.
pub struct WatchSource<T> {
    getter: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> WatchSource<T> {
    /// Observe whatever `getter` reads.
    pub fn getter(getter: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            getter: Box::new(getter),
        }
    }

    /// Observe every field reachable from `source`. The callback receives
    /// `source` itself.
    pub fn deep(source: T) -> Self
    where
        T: Traverse + Clone + Send + Sync + 'static,
    {
        Self::getter(move || {
            source.traverse(&mut HashSet::new());
            source.clone()
        })
    }
}

impl<T> fmt::Debug for WatchSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WatchSource")
    }
}

// ----------------------------------------------------------------------------
// Invalidation
// ----------------------------------------------------------------------------

type Cleanup = Box<dyn FnOnce() + Send>;

/// Registers a hook that fires before the next callback (or when the
/// watcher stops). Use it to mark an in-flight side effect as stale.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    slot: Arc<Mutex<Option<Cleanup>>>,
}

impl OnInvalidate {
    /// Replace the pending hook.
    pub fn register(&self, hook: impl FnOnce() + Send + 'static) {
        *self.slot.lock() = Some(Box::new(hook));
    }

    fn fire(&self) {
        let hook = self.slot.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Watcher
// ----------------------------------------------------------------------------

/// A registered watcher. Dropping it leaves the watcher running.
pub struct WatchHandle<T> {
    effect: Effect<T>,
}

impl<T> WatchHandle<T> {
    /// Stop watching. A pending invalidation hook fires.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl<T> Clone for WatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T> fmt::Debug for WatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .finish()
    }
}

impl Reactivity {
    /// Call `callback(new, old, on_invalidate)` whenever `source` changes.
    pub fn watch<T, C>(
        &self,
        source: WatchSource<T>,
        callback: C,
        options: WatchOptions,
    ) -> WatchHandle<T>
    where
        T: Send + 'static,
        C: Fn(&T, Option<&T>, &OnInvalidate) + Send + Sync + 'static,
    {
        let old: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let on_invalidate = OnInvalidate::default();

        let job = {
            let old = Arc::clone(&old);
            let on_invalidate = on_invalidate.clone();
            Arc::new(move |effect: &Effect<T>| {
                if !effect.is_active() {
                    return;
                }
                let new = effect.run();
                on_invalidate.fire();
                let previous = old.lock().take();
                trace!(effect_id = effect.id().raw(), "watch callback");
                callback(&new, previous.as_ref(), &on_invalidate);
                *old.lock() = Some(new);
            })
        };

        let runtime = self.downgrade();
        let scheduler = {
            let job = Arc::clone(&job);
            move |effect: &Effect<T>| match options.flush {
                Flush::Post => {
                    let Some(runtime) = runtime.upgrade() else {
                        return;
                    };
                    let job = Arc::clone(&job);
                    let effect = effect.clone();
                    Reactivity::from_inner(runtime).queue_post_job(Box::new(move || job(&effect)));
                }
                Flush::Pre | Flush::Sync => job(effect),
            }
        };

        let stop_hook = on_invalidate.clone();
        let effect = self.effect_with(
            source.getter,
            EffectOptions::new()
                .lazy()
                .scheduler(scheduler)
                .on_stop(move || stop_hook.fire()),
        );

        if options.immediate {
            job(&effect);
        } else {
            *old.lock() = Some(effect.run());
        }

        WatchHandle { effect }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Calls = Arc<Mutex<Vec<(Value, Option<Value>)>>>;

    fn recorder() -> (Calls, impl Fn(&Value, Option<&Value>, &OnInvalidate) + Send + Sync) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        (calls, move |new: &Value, old: Option<&Value>, _: &OnInvalidate| {
            log.lock().push((new.clone(), old.cloned()));
        })
    }

    #[test]
    fn getter_watch_reports_new_and_old() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let (calls, callback) = recorder();

        let reader = obj.clone();
        ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            callback,
            WatchOptions::new(),
        );
        assert!(calls.lock().is_empty());

        obj.set("foo", 2).unwrap();
        assert_eq!(
            *calls.lock(),
            vec![(Value::from(2), Some(Value::from(1)))]
        );
    }

    #[test]
    fn deep_watch_sees_nested_writes() {
        let ctx = Reactivity::new();
        let nested = Raw::record([("count", Value::from(0))]);
        let obj = ctx.reactive(&Raw::record([("nested", Value::from(nested.clone()))]));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        ctx.watch(
            WatchSource::deep(Value::from(obj.clone())),
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::new(),
        );

        ctx.reactive(&nested).set("count", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("other", true).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deep_watch_survives_cycles() {
        let ctx = Reactivity::new();
        let raw = Raw::record([("n", Value::from(0))]);
        raw.set("me", raw.clone()).unwrap();
        let obj = ctx.reactive(&raw);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        ctx.watch(
            WatchSource::deep(obj.clone()),
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::new(),
        );

        obj.set("n", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn immediate_runs_at_registration() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let (calls, callback) = recorder();

        let reader = obj.clone();
        ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            callback,
            WatchOptions::new().immediate(),
        );
        assert_eq!(*calls.lock(), vec![(Value::from(1), None)]);
    }

    #[test]
    fn post_flush_defers_the_job() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let (calls, callback) = recorder();

        let reader = obj.clone();
        ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            callback,
            WatchOptions::new().flush(Flush::Post),
        );

        obj.set("foo", 2).unwrap();
        assert!(calls.lock().is_empty());
        assert_eq!(ctx.pending_post_jobs(), 1);

        ctx.flush_post();
        assert_eq!(
            *calls.lock(),
            vec![(Value::from(2), Some(Value::from(1)))]
        );
    }

    #[test]
    fn queued_post_job_is_dropped_after_stop() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let (calls, callback) = recorder();

        let reader = obj.clone();
        let handle = ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            callback,
            WatchOptions::new().flush(Flush::Post),
        );

        obj.set("foo", 2).unwrap();
        handle.stop();
        ctx.flush_post();
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn invalidation_hook_fires_before_next_callback() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let expired = Arc::new(Mutex::new(Vec::new()));

        let reader = obj.clone();
        let log = Arc::clone(&expired);
        let handle = ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            move |new: &Value, _, on_invalidate: &OnInvalidate| {
                let log = Arc::clone(&log);
                let stale = new.clone();
                on_invalidate.register(move || log.lock().push(stale));
            },
            WatchOptions::new(),
        );

        obj.set("foo", 2).unwrap();
        assert!(expired.lock().is_empty());

        obj.set("foo", 3).unwrap();
        assert_eq!(*expired.lock(), vec![Value::from(2)]);

        handle.stop();
        assert_eq!(*expired.lock(), vec![Value::from(2), Value::from(3)]);

        obj.set("foo", 4).unwrap();
        assert_eq!(expired.lock().len(), 2);
    }

    #[test]
    fn stopped_watch_is_silent() {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("foo", Value::from(1))]));
        let (calls, callback) = recorder();

        let reader = obj.clone();
        let handle = ctx.watch(
            WatchSource::getter(move || reader.get("foo")),
            callback,
            WatchOptions::new(),
        );
        handle.stop();
        assert!(!handle.is_active());

        obj.set("foo", 2).unwrap();
        assert!(calls.lock().is_empty());
    }
}
