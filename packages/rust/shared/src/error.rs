//! Error types for helpforge.
//!
//! Library crates use [`HelpForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all helpforge operations.
#[derive(Debug, thiserror::Error)]
pub enum HelpForgeError {
    /// A required reference or identifier was not supplied.
    #[error("missing required argument: {what}")]
    NullArgument { what: String },

    /// A key or value was malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Positional access outside the valid range.
    #[error("index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// A sibling with the same name already exists at that level.
    #[error("duplicate entry name '{name}'")]
    DuplicateName { name: String },

    /// The mutation target is not a current member.
    #[error("entry '{name}' not found")]
    NotFound { name: String },

    /// The operation was attempted before its prerequisites were met.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// Reading or writing a persisted record failed.
    #[error("I/O failure at {path:?}: {message}")]
    IoFailure {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// JSON/TOML serialization error outside of a persisted store.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HelpForgeError>;

impl HelpForgeError {
    pub fn null_argument(what: impl Into<String>) -> Self {
        Self::NullArgument { what: what.into() }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// A persisted record exists but could not be understood.
    pub fn corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::IoFailure {
            path: path.into(),
            message: msg.into(),
            source: None,
        }
    }
}
