//! Boundary error type.
//!
//! Detailed validation codes and source lines live in the diagnostic sink;
//! this type tells the caller which kind of failure occurred.

use alloc::string::String;
use thiserror::Error;

/// Error observable at the library boundary.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Malformed XML, unknown statement, missing mandatory argument, or a
    /// statement that appeared too many times.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown prefix, typedef, identity base, grouping, or key target.
    #[error("unresolvable reference: {0}")]
    Unresolved(String),

    /// Duplicate enum name/value, duplicate key, key misconfiguration, or
    /// duplicate module registration.
    #[error("semantic conflict: {0}")]
    Conflict(String),

    /// Module file not found, not a regular file, or unreadable.
    #[error("i/o error: {0}")]
    Io(String),

    /// Arena capacity exceeded (more than `u32::MAX - 1` entries).
    #[error("capacity exceeded: too many {0}")]
    Capacity(&'static str),
}

/// Convenience alias used throughout the compiler.
pub type Result<T> = core::result::Result<T, Error>;
