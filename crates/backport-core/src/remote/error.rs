//! Errors reported by remote service transports.

/// Errors produced by a [`super::RemoteService`] implementation.
///
/// Transports mark their own failures as retryable or fatal via
/// [`RemoteError::retryable`] / [`RemoteError::fatal`]; callers query
/// [`RemoteError::is_retryable`] instead of inspecting types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The requested branch does not exist on the remote.
    #[error("branch not found: {branch}")]
    BranchNotFound { branch: String },

    /// A request failed.
    #[error("{operation} failed{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Request {
        operation: String,
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// The client does not implement this operation.
    #[error("remote operation not supported: {0}")]
    Unsupported(String),
}

impl RemoteError {
    /// A failure that may succeed if the request is repeated.
    pub fn retryable(
        operation: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        RemoteError::Request {
            operation: operation.into(),
            status,
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not go away on retry.
    pub fn fatal(
        operation: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        RemoteError::Request {
            operation: operation.into(),
            status,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Request { retryable: true, .. })
    }

    pub fn is_branch_not_found(&self) -> bool {
        matches!(self, RemoteError::BranchNotFound { .. })
    }

    /// HTTP status of the failed request, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Request { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type for remote service operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
