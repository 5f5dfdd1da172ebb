//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: reactive handles,
//! effects, computed values, watchers and refs. Everything hangs off a
//! [`Reactivity`] context.
//!
//! # Concepts
//!
//! ## Handles
//!
//! A [`Reactive`] handle wraps a raw record, array, map or set. Reads
//! through it record `(target, key)` against the running computation;
//! writes classify the change (set, add, delete, clear) and notify every
//! computation that read an affected key.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that reruns when its dependencies change.
//! Each run forgets the previous dependencies first, so branches that are no
//! longer taken stop notifying it.
//!
//! ## Computed values
//!
//! A [`Computed`] caches the result of a getter. Dependency changes only mark
//! it dirty; the getter runs again on the next read.
//!
//! ## Watchers
//!
//! [`Reactivity::watch`] calls back with new and old values, inline or
//! deferred to a post flush, with a hook for invalidating stale work.
//!
//! # Implementation Notes
//!
//! The dependency store holds only ids. Handles and effects hold weak links
//! to the context, and the context owns the effect registry, so nothing forms
//! a reference cycle.

mod array;
mod collection;
mod computed;
mod context;
mod dep;
mod effect;
mod handle;
mod refs;
mod runtime;
mod scheduler;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use context::TrackingPause;
pub use dep::{DepKey, TriggerOp};
pub use effect::{Effect, EffectOptions, SchedulerFn};
pub use handle::{is_reactive, is_readonly, to_raw, Mode, Reactive};
pub use refs::{is_ref, unref, AutoUnwrap, Ref};
pub use runtime::{Job, Reactivity, ReactivityBuilder};
pub use scheduler::{ManualFlush, PostFlush, TokioFlush};
pub use subscriber::{EffectId, TargetId};
pub use watch::{Flush, OnInvalidate, Traverse, WatchHandle, WatchOptions, WatchSource};
