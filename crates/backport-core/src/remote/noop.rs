use async_trait::async_trait;

use super::{CreatePrRequest, IssueComment, PrMetadata, PrRef, RemoteError, RemoteResult, RemoteService};

/// Remote client placeholder that rejects every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRemote;

fn unsupported<T>(operation: &str) -> RemoteResult<T> {
    Err(RemoteError::Unsupported(format!("noop client: {operation}")))
}

#[async_trait]
impl RemoteService for NoopRemote {
    async fn get_pull_request(&self, _: &str, _: &str, _: u64) -> RemoteResult<PrMetadata> {
        unsupported("get pull request")
    }

    async fn ensure_branch_exists(&self, _: &str, _: &str, _: &str) -> RemoteResult<()> {
        unsupported("get branch")
    }

    async fn list_cherry_pick_prs(&self, _: &str, _: &str, _: u64, _: &str) -> RemoteResult<Vec<PrRef>> {
        unsupported("list cherry-pick pull requests")
    }

    async fn commit_exists_on_branch(&self, _: &str, _: &str, _: &str, _: &str) -> RemoteResult<bool> {
        unsupported("compare commits")
    }

    async fn create_pull_request(&self, _: &str, _: &str, _: CreatePrRequest) -> RemoteResult<PrRef> {
        unsupported("create pull request")
    }

    async fn has_label(&self, _: &str, _: &str, _: u64, _: &str) -> RemoteResult<bool> {
        unsupported("list labels")
    }

    async fn add_label(&self, _: &str, _: &str, _: u64, _: &str) -> RemoteResult<()> {
        unsupported("add label")
    }

    async fn check_org_membership(&self, _: &str, _: &str) -> RemoteResult<bool> {
        unsupported("check org membership")
    }

    async fn comment_on_pull_request(&self, _: &str, _: &str, _: u64, _: &str) -> RemoteResult<()> {
        unsupported("create comment")
    }

    async fn list_pull_request_comments(&self, _: &str, _: &str, _: u64) -> RemoteResult<Vec<IssueComment>> {
        unsupported("list comments")
    }

    async fn update_comment(&self, _: &str, _: &str, _: u64, _: &str) -> RemoteResult<()> {
        unsupported("edit comment")
    }
}
