//! Errors raised by individual transforms.
//!
//! The chain wraps these into [`harvester_shared::HarvesterError::Transformation`]
//! together with the step index, transform name and scope.

use crate::path::PathError;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Name outside the closed transform set.
    #[error("unknown transformation '{0}'")]
    Unknown(String),

    /// Options bag does not match the transform's option structure.
    #[error("invalid options for '{transform}': {message}")]
    Options {
        transform: &'static str,
        message: String,
    },

    /// A required option is absent or empty.
    #[error("missing '{option}' option for '{transform}'")]
    MissingOption {
        transform: &'static str,
        option: &'static str,
    },

    /// The value's runtime shape is not accepted by the transform.
    #[error("'{transform}' expects {expected}, got {found}")]
    TypeMismatch {
        transform: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },

    #[error(transparent)]
    Path(#[from] PathError),

    /// The result cannot be placed where the step asked for it.
    #[error("placement error: {0}")]
    Placement(String),

    /// The transform ran but could not produce a value.
    #[error("'{transform}' failed: {message}")]
    Failed {
        transform: &'static str,
        message: String,
    },
}

impl TransformError {
    pub(crate) fn failed(transform: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            transform,
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(
        transform: &'static str,
        expected: &'static str,
        found: &serde_json::Value,
    ) -> Self {
        Self::TypeMismatch {
            transform,
            expected,
            found: crate::value::kind_of(found),
        }
    }
}
