//! Error types for the operator library.

use thiserror::Error;

/// Errors raised by the operator core.
///
/// Only [`OperatorError::Malformed`] is scoped to a single object; every other
/// variant abandons the current reconciliation tick.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("resource store request failed: {0}")]
    Store(#[source] kube::Error),

    #[error("worker discovery with selector '{selector}' failed: {source}")]
    Discovery {
        selector: String,
        #[source]
        source: kube::Error,
    },

    #[error("malformed object {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build probe client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("CRD bootstrap failed for {path}: {reason}")]
    Bootstrap { path: String, reason: String },
}

impl OperatorError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        OperatorError::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn bootstrap(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        OperatorError::Bootstrap {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error only affects a single object
    pub fn is_object_scoped(&self) -> bool {
        matches!(self, OperatorError::Malformed { .. })
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
