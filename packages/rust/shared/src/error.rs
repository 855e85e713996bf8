//! Error types for Wisdom.
//!
//! Library crates use [`WisdomError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all export operations.
#[derive(Debug, thiserror::Error)]
pub enum WisdomError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Token acquisition failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network/HTTP error talking to the remote API.
    #[error("network error: {0}")]
    Network(String),

    /// Response payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (row width, missing column, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An article's key prefix has no registered article type.
    #[error("article {article_id} has unregistered key prefix '{prefix}'")]
    UnknownArticleType { article_id: String, prefix: String },

    /// Augmentation could not find the persisted metadata for a row.
    #[error("missing metadata for article {article_id} at {path:?}")]
    MissingMetadata { article_id: String, path: PathBuf },

    /// A stage task panicked or was cancelled.
    #[error("task failed in stage '{stage}': {message}")]
    Task { stage: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WisdomError>;

impl WisdomError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a per-article task may log this error and carry on.
    ///
    /// Network and payload errors only cost the article being fetched.
    /// Everything else (filesystem, schema, auth) ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Parse { .. })
    }
}
