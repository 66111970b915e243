use async_trait::async_trait;

use super::{GitResult, Workspace, WorkspaceExecutor};

/// Executor whose workspaces accept every operation without touching disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

#[derive(Debug, Default)]
struct NoopWorkspace;

#[async_trait]
impl WorkspaceExecutor for NoopExecutor {
    async fn prepare(&self, _owner: &str, _repo: &str) -> GitResult<Box<dyn Workspace>> {
        Ok(Box::new(NoopWorkspace))
    }
}

#[async_trait]
impl Workspace for NoopWorkspace {
    async fn checkout_branch(&mut self, _branch: &str) -> GitResult<()> {
        Ok(())
    }

    async fn create_branch_from(&mut self, _branch: &str, _from: &str) -> GitResult<()> {
        Ok(())
    }

    async fn cherry_pick(&mut self, _commit: &str) -> GitResult<()> {
        Ok(())
    }

    async fn abort_cherry_pick(&mut self) -> GitResult<()> {
        Ok(())
    }

    async fn commit_allow_empty(&mut self, _message: &str) -> GitResult<()> {
        Ok(())
    }

    async fn push_branch(&mut self, _branch: &str) -> GitResult<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> GitResult<()> {
        Ok(())
    }
}
