//! Local git workspaces used to build cherry-pick branches.

mod error;
mod noop;
mod process;
mod shell;
mod signing;

use async_trait::async_trait;

pub use error::{GitError, GitResult};
pub use noop::NoopExecutor;
pub use shell::{RemoteUrl, ShellExecutor, ShellWorkspace};
pub use signing::SigningConfig;

/// Creates workspaces; one per target execution.
#[async_trait]
pub trait WorkspaceExecutor: Send + Sync {
    async fn prepare(&self, owner: &str, repo: &str) -> GitResult<Box<dyn Workspace>>;
}

/// Git primitives needed to build and publish a cherry-pick branch.
#[async_trait]
pub trait Workspace: Send {
    async fn checkout_branch(&mut self, branch: &str) -> GitResult<()>;

    /// Create (or force-reset) `branch` at the remote tip of `from`.
    async fn create_branch_from(&mut self, branch: &str, from: &str) -> GitResult<()>;

    /// Cherry-pick `commit`, using mainline parent 1 for merge commits.
    async fn cherry_pick(&mut self, commit: &str) -> GitResult<()>;

    /// Abort an in-progress cherry-pick; succeeds when none is in progress.
    async fn abort_cherry_pick(&mut self) -> GitResult<()>;

    async fn commit_allow_empty(&mut self, message: &str) -> GitResult<()>;

    /// Push with `--force-with-lease`.
    async fn push_branch(&mut self, branch: &str) -> GitResult<()>;

    async fn cleanup(&mut self) -> GitResult<()>;
}
