//! Tether Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Reactive handles over records, arrays, maps and sets
//! - Effects with cleanup-before-rerun and pluggable schedulers
//! - Lazily cached computed values
//! - Watchers with immediate, inline and post-flush modes
//! - Refs and auto-unwrapping views
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value model and raw composites
//! - `reactive`: the context, dependency store and every reactive primitive
//! - `host`: the boundary to whatever displays reactive state
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{Raw, Reactivity, Value};
//!
//! let ctx = Reactivity::new();
//! let state = ctx.reactive(&Raw::record([("count", Value::from(0))]));
//!
//! // Create a derived value
//! let reader = state.clone();
//! let doubled = ctx.computed(move || {
//!     reader.get("count").as_number().unwrap_or(0.0) * 2.0
//! });
//!
//! // Create an effect
//! let reader = state.clone();
//! ctx.effect(move || {
//!     println!("Count: {}, Doubled: {}", reader.get("count"), doubled.get());
//! });
//!
//! // Update the state
//! state.set("count", 5)?;
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod host;
pub mod reactive;
pub mod value;

mod error;

pub use error::{ReactiveError, Result};
pub use reactive::{
    is_reactive, is_readonly, is_ref, to_raw, unref, AutoUnwrap, Computed, Effect,
    EffectOptions, Flush, Reactive, Reactivity, Ref, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{Method, Raw, RawKind, Value};
