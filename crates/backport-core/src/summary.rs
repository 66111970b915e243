//! Human and machine readable reports of a run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{BackportError, Result};
use crate::orchestrator::{RunResult, TargetResult, TargetStatus};
use crate::remote::RemoteService;

/// Hidden line identifying the summary comment on the source PR.
pub const SUMMARY_COMMENT_MARKER: &str = "<!-- backport-summary -->";

const SUMMARY_HEADING: &str = "## Cherry-pick summary";

fn sanitize_cell(value: &str) -> String {
    let value = value.replace('|', "\\|").replace('\n', "<br>");
    match value.trim() {
        "" => "-".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn pr_cell(target: &TargetResult) -> String {
    if let Some(created) = &target.created_pr {
        if created.url.is_empty() {
            return format!("PR #{}", created.number);
        }
        return format!("[PR #{}]({})", created.number, created.url);
    }
    match &target.existing_pr {
        Some(existing) if !existing.url.is_empty() => format!("[Existing #{}]({})", existing.number, existing.url),
        _ => "-".to_string(),
    }
}

/// Markdown table of target outcomes, or a one-line notice for skipped runs.
pub fn render_result_details(result: &RunResult) -> String {
    if result.skipped {
        let reason = match result.skipped_reason.as_str() {
            "" => "run skipped",
            reason => reason,
        };
        return format!("Skipped cherry-pick orchestration: {}\n", sanitize_cell(reason));
    }
    if result.targets.is_empty() {
        return "No cherry-pick targets were evaluated.\n".to_string();
    }

    let mut out = String::from("| Branch | Status | Details | PR |\n| --- | --- | --- | --- |\n");
    for target in &result.targets {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            sanitize_cell(&target.target.branch),
            sanitize_cell(target.status.as_str()),
            sanitize_cell(&target.reason),
            sanitize_cell(&pr_cell(target)),
        ));
    }
    out
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Append the run summary to the job summary file.
pub fn append_step_summary(path: &Path, result: &RunResult) -> Result<()> {
    let mut file = open_append(path)?;
    let mut text = format!("{SUMMARY_HEADING}\n\n{}", render_result_details(result));
    if !text.ends_with('\n') {
        text.push('\n');
    }
    file.write_all(text.as_bytes())?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct CreatedPrOutput<'a> {
    branch: &'a str,
    number: u64,
    url: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Serialize)]
struct SkippedTargetOutput<'a> {
    branch: &'a str,
    status: TargetStatus,
    reason: &'a str,
}

#[derive(Debug, Serialize)]
struct RunSummaryOutput<'a> {
    skipped: bool,
    skipped_reason: &'a str,
}

/// `(created_prs, skipped_targets, run_summary)` JSON documents.
pub fn render_outputs(result: &RunResult) -> Result<[(&'static str, String); 3]> {
    let created: Vec<CreatedPrOutput<'_>> = result
        .targets
        .iter()
        .filter(|t| t.status.created_pr())
        .filter_map(|t| {
            t.created_pr.as_ref().map(|pr| CreatedPrOutput {
                branch: &t.target.branch,
                number: pr.number,
                url: &pr.url,
                head: &pr.head_branch,
                base: &pr.base_branch,
            })
        })
        .collect();

    let skipped: Vec<SkippedTargetOutput<'_>> = result
        .targets
        .iter()
        .filter(|t| t.status.is_skipped() || matches!(t.status, TargetStatus::Failed | TargetStatus::DryRun))
        .map(|t| SkippedTargetOutput {
            branch: &t.target.branch,
            status: t.status,
            reason: &t.reason,
        })
        .collect();

    let summary = RunSummaryOutput {
        skipped: result.skipped,
        skipped_reason: &result.skipped_reason,
    };

    Ok([
        ("created_prs", serde_json::to_string(&created)?),
        ("skipped_targets", serde_json::to_string(&skipped)?),
        ("run_summary", serde_json::to_string(&summary)?),
    ])
}

/// Append the action outputs in `key<<EOF` heredoc form.
pub fn write_outputs(path: &Path, result: &RunResult) -> Result<()> {
    let outputs = render_outputs(result)?;
    let mut file = open_append(path)?;
    for (key, value) in outputs {
        writeln!(file, "{key}<<EOF\n{value}\nEOF")?;
    }
    Ok(())
}

/// Body of the summary comment posted on the source PR.
pub fn build_summary_comment_body(result: &RunResult) -> String {
    format!(
        "{SUMMARY_COMMENT_MARKER}\n{SUMMARY_HEADING}\n\n{}",
        render_result_details(result)
    )
}

/// What [`upsert_summary_comment`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentUpsert {
    Created,
    Updated(u64),
    Unchanged(u64),
}

/// Create the summary comment, or update the one carrying the marker.
pub async fn upsert_summary_comment(
    remote: &dyn RemoteService,
    owner: &str,
    repo: &str,
    number: u64,
    result: &RunResult,
) -> Result<CommentUpsert> {
    let body = build_summary_comment_body(result);
    let comments = remote
        .list_pull_request_comments(owner, repo, number)
        .await
        .map_err(|err| BackportError::remote("list pull request comments", err))?;

    match comments.into_iter().find(|c| c.body.contains(SUMMARY_COMMENT_MARKER)) {
        Some(existing) if existing.body == body => Ok(CommentUpsert::Unchanged(existing.id)),
        Some(existing) => {
            remote
                .update_comment(owner, repo, existing.id, &body)
                .await
                .map_err(|err| BackportError::remote("update summary comment", err))?;
            Ok(CommentUpsert::Updated(existing.id))
        }
        None => {
            remote
                .comment_on_pull_request(owner, repo, number, &body)
                .await
                .map_err(|err| BackportError::remote("create summary comment", err))?;
            Ok(CommentUpsert::Created)
        }
    }
}
