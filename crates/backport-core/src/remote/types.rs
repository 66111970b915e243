//! Data exchanged with the hosting service.

use serde::{Deserialize, Serialize};

/// Snapshot of a source pull request. Never mutated by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrMetadata {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    /// Empty when the service has not computed a merge commit.
    pub merge_commit_sha: String,
    pub head_sha: String,
    pub head_ref: String,
    pub head_owner: String,
    pub head_repo: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub is_merged: bool,
    pub is_from_fork: bool,
}

impl PrMetadata {
    /// Commit to cherry-pick: the merge commit, falling back to the head commit.
    pub fn source_commit(&self) -> Option<&str> {
        [self.merge_commit_sha.trim(), self.head_sha.trim()]
            .into_iter()
            .find(|sha| !sha.is_empty())
    }
}

/// Reference to a pull request on the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRef {
    pub url: String,
    pub number: u64,
    pub head_branch: String,
    pub base_branch: String,
}

/// Request to open a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub maintainer_can_modify: bool,
}

/// Issue or pull request comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
}
