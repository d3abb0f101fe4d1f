//! Error types for Harvester.
//!
//! Library crates use [`HarvesterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Harvester operations.
///
/// None of these variants is fatal to the process: a failing tick ends early
/// and the next scheduled trigger runs independently.
#[derive(Debug, thiserror::Error)]
pub enum HarvesterError {
    /// Missing or invalid configuration; the job or destination is not created.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP failure while fetching a job input.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The response content-type matched no known payload kind.
    #[error("unrecognized content type '{content_type}'")]
    ContentType { content_type: String },

    /// Merged fetch results do not share the same shape class.
    #[error("merge shape error: {message}")]
    MergeShape { message: String },

    /// A transformation step failed; the rest of that chain is abandoned.
    #[error("transformation '{name}' (#{index}) failed in {scope}: {message}")]
    Transformation {
        scope: String,
        index: usize,
        name: String,
        message: String,
    },

    /// Payload decoding error (e.g. invalid JSON body).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Payload validation error (e.g. input chain produced a scalar).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A destination rejected or failed a write.
    #[error("destination error: {0}")]
    Destination(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvesterError>;

impl HarvesterError {
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

    /// Create a merge shape error from any displayable message.
    pub fn merge_shape(msg: impl Into<String>) -> Self {
        Self::MergeShape {
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
}
