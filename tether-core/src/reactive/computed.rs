//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. Creation registers a lazy effect around the getter. Nothing runs yet.
//!
//! 2. On read, if the value is dirty, the getter runs inside that effect
//!    (collecting dependencies) and the result is cached.
//!
//! 3. When a dependency changes, the effect's scheduler only marks the
//!    value dirty and notifies whoever read the computed value. The getter
//!    does not run until the next read.
//!
//! # Why This Matters
//!
//! - A field changes
//! - 10 computed values depend on it
//! - Only the ones that are read again recompute
//!
//! A computed value is itself a trackable target: reading it inside an
//! effect subscribes that effect to the computed value's `value` key, and
//! invalidation triggers that key.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::dep::{DepKey, TriggerOp};
use super::effect::{Effect, EffectOptions};
use super::runtime::RuntimeInner;
use super::{Reactivity, TargetId};

/// A lazily computed, cached value.
///
/// Cloning shares the cache. When the last clone is dropped the underlying
/// effect is stopped.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    target: TargetId,
    runtime: Weak<RuntimeInner>,
    effect: Effect<T>,
    state: Mutex<ComputedState<T>>,
}

struct ComputedState<T> {
    dirty: bool,
    value: Option<T>,
}

impl<T> Computed<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new<F>(ctx: &Reactivity, getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let options = EffectOptions::new().lazy().scheduler(move |_: &Effect<T>| {
                if let Some(inner) = this.upgrade() {
                    inner.invalidate();
                }
            });

            ComputedInner {
                target: TargetId::next(),
                runtime: ctx.downgrade(),
                effect: Effect::new(ctx, getter, options),
                state: Mutex::new(ComputedState {
                    dirty: true,
                    value: None,
                }),
            }
        });

        Self { inner }
    }

    /// Current value, recomputed first if a dependency changed.
    pub fn get(&self) -> T {
        let cached = {
            let state = self.inner.state.lock();
            if state.dirty {
                None
            } else {
                state.value.clone()
            }
        };

        let value = match cached {
            Some(value) => value,
            None => {
                let value = self.inner.effect.run();
                let mut state = self.inner.state.lock();
                state.value = Some(value.clone());
                state.dirty = false;
                value
            }
        };

        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(self.inner.target, DepKey::value());
        }
        value
    }
}

impl<T> Computed<T> {
    /// Whether the next read will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// The lazy effect wrapping the getter.
    pub fn effect(&self) -> &Effect<T> {
        &self.inner.effect
    }

    pub fn id(&self) -> TargetId {
        self.inner.target
    }

    pub fn ptr_eq(&self, other: &Computed<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> ComputedInner<T> {
    fn invalidate(&self) {
        self.state.lock().dirty = true;

        if let Some(runtime) = self.runtime.upgrade() {
            runtime.trigger(self.target, None, DepKey::value(), TriggerOp::Set, None);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target_id", &self.inner.target)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl Reactivity {
    /// Create a lazily computed value.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, getter)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
