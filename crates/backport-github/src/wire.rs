//! REST payloads. Only the fields the transport reads are modelled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct User {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Label {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Repository {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<User>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GitRef {
    #[serde(rename = "ref", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub repo: Option<Repository>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub head: Option<GitRef>,
    #[serde(default)]
    pub base: Option<GitRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Comparison {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewPullRequest<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    pub body: &'a str,
    pub draft: bool,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct LabelsRequest<'a> {
    pub labels: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct AssigneesRequest<'a> {
    pub assignees: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentRequest<'a> {
    pub body: &'a str,
}
