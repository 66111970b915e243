//! Errors raised while constructing a GitHub client

use thiserror::Error;

/// Client construction failures. Request failures are reported as
/// [`backport_core::RemoteError`].
#[derive(Error, Debug)]
pub enum GitHubError {
    /// No token was configured
    #[error("github token is required")]
    MissingToken,

    /// The token cannot be sent as a header value
    #[error("github token contains characters not allowed in an HTTP header")]
    InvalidToken,

    /// A base or upload URL failed validation
    #[error("invalid github {kind} url {url:?}: {reason}")]
    InvalidEndpoint {
        kind: &'static str,
        url: String,
        reason: String,
    },

    /// Enterprise URLs must be configured together
    #[error("{0}")]
    IncompleteEnterprise(&'static str),

    /// The underlying HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, GitHubError>;
