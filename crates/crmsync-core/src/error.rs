//! Core error types for crmsync-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! shortcut parsing and configuration failures.

use thiserror::Error;

/// Errors produced by the crmsync-core crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A shortcut string could not be parsed.
    #[error("invalid shortcut '{input}': {reason}")]
    InvalidShortcut { input: String, reason: String },

    /// A configuration value was present but malformed.
    #[error("invalid configuration value for {name}: '{value}'")]
    InvalidConfig { name: String, value: String },
}
