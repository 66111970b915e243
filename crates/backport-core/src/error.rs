//! Run-level error taxonomy.
//!
//! Per-target failures never surface here; they are recorded on the
//! corresponding [`crate::TargetResult`]. A [`BackportError`] aborts the whole
//! run before (or instead of) touching any target.

use crate::remote::RemoteError;

/// Errors that abort an orchestration run.
#[derive(Debug, thiserror::Error)]
pub enum BackportError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid branch {branch:?} from label {label:?}: {reason}")]
    InvalidTarget {
        branch: String,
        label: String,
        reason: String,
    },

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("source commit SHA could not be determined")]
    MissingSourceCommit,

    #[error("{0} is required")]
    MissingCollaborator(&'static str),

    #[error("event payload error: {0}")]
    Event(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackportError {
    /// Wrap a remote failure with the step that produced it.
    pub fn remote(context: impl Into<String>, source: RemoteError) -> Self {
        BackportError::Remote {
            context: context.into(),
            source,
        }
    }

    /// Whether the error came from the remote service and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackportError::Remote { source, .. } if source.is_retryable())
    }
}

/// Result type for run-level operations.
pub type Result<T> = std::result::Result<T, BackportError>;
