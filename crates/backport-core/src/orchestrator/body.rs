//! Pull request text for cherry-pick PRs.

use crate::remote::{CreatePrRequest, PrMetadata};
use crate::targets::Target;

const FOOTER: &str = "--\nAutomated cherry-pick by backport.";

/// `<!-- cherry-pick-of: owner/repo#123 -> release/v1 -->`
pub fn marker_comment(pr: &PrMetadata, target_branch: &str) -> String {
    let owner = pr.owner.trim();
    let repo = pr.repo.trim();
    let source = match (owner.is_empty(), repo.is_empty()) {
        (false, false) => format!("{owner}/{repo}"),
        (_, false) => repo.to_string(),
        (_, true) => "unknown-repo".to_string(),
    };
    format!("<!-- cherry-pick-of: {source}#{} -> {target_branch} -->", pr.number)
}

pub fn pr_title(pr: &PrMetadata, target_branch: &str) -> String {
    format!("[{target_branch}] {}", pr.title)
}

pub fn pr_body(pr: &PrMetadata, target_branch: &str) -> String {
    let mut body = marker_comment(pr, target_branch);
    body.push('\n');
    body.push_str(&format!("Cherry pick of #{} into `{target_branch}`.\n\n", pr.number));
    if !pr.body.is_empty() {
        body.push_str(&pr.body);
        body.push_str("\n\n");
    }
    body.push_str(FOOTER);
    body
}

/// Drop labels starting with `prefix` (case-insensitive) so trigger and done
/// labels never reach the cherry-pick PR.
pub fn filter_labels(labels: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    labels
        .iter()
        .filter(|label| prefix.is_empty() || !label.trim().to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}

pub fn create_request(pr: &PrMetadata, target: &Target, head: &str, label_prefix: &str) -> CreatePrRequest {
    CreatePrRequest {
        title: pr_title(pr, &target.branch),
        body: pr_body(pr, &target.branch),
        head: head.to_string(),
        base: target.branch.clone(),
        draft: false,
        labels: filter_labels(&pr.labels, label_prefix),
        assignees: pr.assignees.clone(),
        maintainer_can_modify: true,
    }
}

/// Prefix `original` with a conflict notice and the git error text.
pub fn decorate_placeholder_body(original: &str, pr_number: u64, branch: &str, error: &str) -> String {
    let error = error.trim();
    let mut body = format!(
        "⚠️ Automated cherry-pick of #{pr_number} into `{branch}` encountered conflicts.\n\n\
         Please resolve the conflicts manually and update this pull request.\n\n"
    );
    if !error.is_empty() {
        body.push_str("The git command reported:\n\n```\n");
        body.push_str(error);
        body.push_str("\n```\n\n");
    }
    body.push_str(original);
    body
}

pub fn placeholder_commit_message(pr_number: u64, branch: &str) -> String {
    format!("Placeholder cherry-pick for #{pr_number} into {branch}")
}

pub fn done_label(label_prefix: &str, branch: &str) -> String {
    format!("{label_prefix}done/{branch}")
}
