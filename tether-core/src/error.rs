//! Error types for the reactive engine.
//!
//! Writes against read-only handles are *not* errors: they are soft
//! rejections that log a warning and report success. The variants here cover
//! operations that make no sense for the kind of value they were applied to.

use thiserror::Error;

use crate::value::RawKind;

/// Errors returned by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The operation does not exist for this kind of composite.
    #[error("`{op}` is not supported on {kind} values")]
    Unsupported { op: &'static str, kind: RawKind },

    /// The key cannot address a slot of this kind of composite
    /// (e.g. a non-numeric key on an array).
    #[error("invalid key `{key}` for {kind} value")]
    InvalidKey { key: String, kind: RawKind },

    /// An array length must be a non-negative integer.
    #[error("invalid array length: {0}")]
    InvalidLength(String),

    /// The target of the operation is a primitive, not a composite.
    #[error("value is not a composite object")]
    NotComposite,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
