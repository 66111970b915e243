//! Remote service boundary.
//!
//! [`RemoteService`] is everything the orchestrator needs from the hosting
//! service. The REST transport lives in the `backport-github` crate; in-memory
//! implementations live in [`crate::fakes`].

mod error;
mod noop;
mod types;

use async_trait::async_trait;

pub use error::{RemoteError, RemoteResult};
pub use noop::NoopRemote;
pub use types::{CreatePrRequest, IssueComment, PrMetadata, PrRef};

/// Read/write operations against the hosting service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn get_pull_request(&self, owner: &str, repo: &str, number: u64) -> RemoteResult<PrMetadata>;

    /// `Ok(())` when the branch exists, [`RemoteError::BranchNotFound`] when it does not.
    async fn ensure_branch_exists(&self, owner: &str, repo: &str, branch: &str) -> RemoteResult<()>;

    /// Cherry-pick pull requests (any state) for `source_pr` onto `target_branch`.
    async fn list_cherry_pick_prs(
        &self,
        owner: &str,
        repo: &str,
        source_pr: u64,
        target_branch: &str,
    ) -> RemoteResult<Vec<PrRef>>;

    async fn commit_exists_on_branch(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
        branch: &str,
    ) -> RemoteResult<bool>;

    async fn create_pull_request(&self, owner: &str, repo: &str, request: CreatePrRequest) -> RemoteResult<PrRef>;

    async fn has_label(&self, owner: &str, repo: &str, number: u64, label: &str) -> RemoteResult<bool>;

    async fn add_label(&self, owner: &str, repo: &str, number: u64, label: &str) -> RemoteResult<()>;

    async fn check_org_membership(&self, org: &str, user: &str) -> RemoteResult<bool>;

    async fn comment_on_pull_request(&self, owner: &str, repo: &str, number: u64, body: &str) -> RemoteResult<()>;

    async fn list_pull_request_comments(&self, owner: &str, repo: &str, number: u64) -> RemoteResult<Vec<IssueComment>>;

    async fn update_comment(&self, owner: &str, repo: &str, comment_id: u64, body: &str) -> RemoteResult<()>;
}
