//! `pull_request` webhook payload decoding.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BackportError, Result};

/// Event names the runner acts on.
pub const SUPPORTED_EVENTS: [&str; 2] = ["pull_request", "pull_request_target"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestAction {
    Closed,
    Labeled,
    Other,
}

impl PullRequestAction {
    fn parse(action: &str) -> Self {
        match action {
            "closed" => PullRequestAction::Closed,
            "labeled" => PullRequestAction::Labeled,
            _ => PullRequestAction::Other,
        }
    }

    /// Only merges and label additions can introduce new targets.
    pub fn is_actionable(self) -> bool {
        matches!(self, PullRequestAction::Closed | PullRequestAction::Labeled)
    }
}

/// The subset of a `pull_request` event used by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    /// Lowercased action, e.g. `closed`.
    pub action: String,
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub merged: bool,
    pub merge_commit_sha: String,
    pub head_sha: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    /// Label added by a `labeled` action.
    pub label: Option<String>,
}

impl PullRequestEvent {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let raw: RawEvent = serde_json::from_reader(reader)
            .map_err(|err| BackportError::Event(format!("decode pull_request event: {err}")))?;
        Ok(raw.into())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|err| BackportError::Event(format!("open event file {}: {err}", path.display())))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn action(&self) -> PullRequestAction {
        PullRequestAction::parse(&self.action)
    }

    /// Reject payloads that cannot identify a pull request.
    pub fn ensure_identified(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(BackportError::Event("event payload missing repository owner/name".to_string()));
        }
        if self.number == 0 {
            return Err(BackportError::Event("event payload missing pull request number".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    action: Option<String>,
    repository: Option<RawRepository>,
    pull_request: Option<RawPullRequest>,
    label: Option<RawNamed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRepository {
    name: Option<String>,
    owner: Option<RawUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommitRef {
    sha: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPullRequest {
    number: Option<u64>,
    merged: Option<bool>,
    merge_commit_sha: Option<String>,
    head: Option<RawCommitRef>,
    title: Option<String>,
    body: Option<String>,
    labels: Vec<RawNamed>,
    assignees: Vec<RawUser>,
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn non_empty_trimmed(values: impl Iterator<Item = Option<String>>) -> Vec<String> {
    values.map(trimmed).filter(|v| !v.is_empty()).collect()
}

impl From<RawEvent> for PullRequestEvent {
    fn from(raw: RawEvent) -> Self {
        let repository = raw.repository.unwrap_or_default();
        let pr = raw.pull_request.unwrap_or_default();
        Self {
            action: trimmed(raw.action).to_lowercase(),
            owner: trimmed(repository.owner.and_then(|o| o.login)),
            repo: trimmed(repository.name),
            number: pr.number.unwrap_or_default(),
            merged: pr.merged.unwrap_or_default(),
            merge_commit_sha: trimmed(pr.merge_commit_sha),
            head_sha: trimmed(pr.head.and_then(|h| h.sha)),
            title: pr.title.unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            labels: non_empty_trimmed(pr.labels.into_iter().map(|l| l.name)),
            assignees: non_empty_trimmed(pr.assignees.into_iter().map(|a| a.login)),
            label: raw.label.map(|l| trimmed(l.name)).filter(|l| !l.is_empty()),
        }
    }
}
