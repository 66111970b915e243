//! GitHub REST transport for backport orchestration.
//!
//! [`GitHubClient`] implements [`backport_core::RemoteService`] over `reqwest`:
//! public github.com or an Enterprise instance, bearer-token auth, paginated
//! listing and retry with exponential backoff for retryable read failures.

pub mod client;
pub mod endpoint;
pub mod error;
mod wire;

pub use client::{GitHubClient, GitHubConfig, DEFAULT_USER_AGENT};
pub use endpoint::{normalize_url, Endpoints, DEFAULT_API_URL};
pub use error::{GitHubError, Result};
