//! Per-pull-request cherry-pick state machine.
//!
//! [`Orchestrator::process_pull_request`] resolves the targets of a merged pull
//! request, evaluates each one against the remote (done label, branch
//! existence, existing cherry-pick PR, commit presence) and then executes the
//! remaining ones sequentially, each in its own workspace.

pub mod body;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{BackportError, Result};
use crate::naming::branch_name_for;
use crate::remote::{PrMetadata, PrRef, RemoteService};
use crate::targets::{collect_targets, manual_targets, merge_targets, validate_targets, Target};
use crate::workspace::{GitError, Workspace, WorkspaceExecutor};

pub const DEFAULT_LABEL_PREFIX: &str = "cherry-pick/";

const REASON_NOT_MERGED: &str = "not merged";
const REASON_FORK: &str =
    "pull request originates from a fork; create a branch in the base repository before labeling";
const REASON_NO_TARGETS: &str = "no targets";
const REASON_MISSING_BRANCH: &str =
    "target branch not found in repository; ensure the release branch exists or remove the label";
const REASON_EXISTING_PR: &str = "cherry-pick PR already exists";
const REASON_COMMIT_PRESENT: &str = "commit already present on target";
const REASON_DRY_RUN: &str = "dry run enabled";
const REASON_CREATED: &str = "cherry-pick pull request created";

/// What to do when the cherry-pick conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Mark the target failed.
    #[default]
    Fail,
    /// Push an empty commit and open a PR asking for manual resolution.
    PlaceholderPr,
}

impl ConflictStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictStrategy::Fail => "fail",
            ConflictStrategy::PlaceholderPr => "placeholder-pr",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = BackportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(ConflictStrategy::Fail),
            "placeholder-pr" => Ok(ConflictStrategy::PlaceholderPr),
            other => Err(BackportError::InvalidConfiguration(format!(
                "conflict strategy must be 'fail' or 'placeholder-pr', got {other:?}"
            ))),
        }
    }
}

/// Runtime controls for one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub label_prefix: String,
    pub conflict_strategy: ConflictStrategy,
    pub dry_run: bool,
    /// Branches targeted regardless of labels.
    pub target_branches: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            conflict_strategy: ConflictStrategy::default(),
            dry_run: false,
            target_branches: Vec::new(),
        }
    }
}

/// Evaluation/execution state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    DryRun,
    Succeeded,
    Failed,
    PlaceholderPr,
    SkippedMissingBranch,
    SkippedExistingPr,
    SkippedCommitPresent,
}

impl TargetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::DryRun => "dry_run",
            TargetStatus::Succeeded => "succeeded",
            TargetStatus::Failed => "failed",
            TargetStatus::PlaceholderPr => "placeholder_pr",
            TargetStatus::SkippedMissingBranch => "skipped_missing_branch",
            TargetStatus::SkippedExistingPr => "skipped_existing_pr",
            TargetStatus::SkippedCommitPresent => "skipped_commit_present",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TargetStatus::Pending
    }

    pub fn is_skipped(self) -> bool {
        matches!(
            self,
            TargetStatus::SkippedMissingBranch | TargetStatus::SkippedExistingPr | TargetStatus::SkippedCommitPresent
        )
    }

    /// Whether a pull request was opened for the target.
    pub fn created_pr(self) -> bool {
        matches!(self, TargetStatus::Succeeded | TargetStatus::PlaceholderPr)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: Target,
    pub status: TargetStatus,
    pub reason: String,
    pub existing_pr: Option<PrRef>,
    pub created_pr: Option<PrRef>,
}

impl TargetResult {
    pub fn pending(target: Target) -> Self {
        Self {
            target,
            status: TargetStatus::Pending,
            reason: String::new(),
            existing_pr: None,
            created_pr: None,
        }
    }

    fn settle(&mut self, status: TargetStatus, reason: impl Into<String>) {
        debug_assert!(!self.status.is_terminal(), "target result settled twice");
        self.status = status;
        self.reason = reason.into();
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        self.settle(TargetStatus::Failed, reason);
        self
    }
}

/// Output of one orchestration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub skipped: bool,
    pub skipped_reason: String,
    pub targets: Vec<TargetResult>,
}

impl RunResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skipped_reason: reason.into(),
            targets: Vec::new(),
        }
    }

    fn with_targets(targets: Vec<TargetResult>) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    /// Branches whose target ended `failed`.
    pub fn failed_branches(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.status == TargetStatus::Failed)
            .map(|t| t.target.branch.as_str())
            .collect()
    }
}

/// Source pull request facts shared by every target of a run.
struct Source<'a> {
    owner: &'a str,
    repo: &'a str,
    pr: &'a PrMetadata,
    commit: &'a str,
}

/// Drives evaluation and execution of cherry-pick targets for pull requests.
pub struct Orchestrator {
    config: OrchestratorConfig,
    remote: Arc<dyn RemoteService>,
    executor: Option<Arc<dyn WorkspaceExecutor>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            config,
            remote,
            executor: None,
        }
    }

    /// Executor used for non-dry runs.
    pub fn with_executor(mut self, executor: Arc<dyn WorkspaceExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Evaluate and (unless dry run) execute every target of `owner/repo#number`.
    ///
    /// Per-target failures are recorded on the returned [`RunResult`]; an
    /// `Err` means the run was aborted before or during evaluation.
    pub async fn process_pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<RunResult> {
        let span = info_span!("backport.run", owner = %owner, repo = %repo, pr = number);
        self.run(owner, repo, number).instrument(span).await
    }

    async fn run(&self, owner: &str, repo: &str, number: u64) -> Result<RunResult> {
        info!(
            event = "run.started",
            dry_run = self.config.dry_run,
            conflict_strategy = %self.config.conflict_strategy,
        );

        let pr = self
            .remote
            .get_pull_request(owner, repo, number)
            .await
            .map_err(|err| BackportError::remote("get pull request", err))?;

        if !pr.is_merged {
            info!(event = "run.skipped", reason = REASON_NOT_MERGED);
            return Ok(RunResult::skipped(REASON_NOT_MERGED));
        }
        if pr.is_from_fork {
            info!(
                event = "run.skipped",
                reason = "fork",
                head_owner = %pr.head_owner,
                head_repo = %pr.head_repo,
            );
            return Ok(RunResult::skipped(REASON_FORK));
        }

        if self.resolve_targets(&pr)?.is_empty() {
            info!(event = "run.skipped", reason = "no matching labels or overrides");
            return Ok(RunResult::skipped(REASON_NO_TARGETS));
        }

        // Labels may have changed since the first read.
        let pr = self
            .remote
            .get_pull_request(owner, repo, number)
            .await
            .map_err(|err| BackportError::remote("refresh pull request", err))?;
        let targets = self.resolve_targets(&pr)?;
        if targets.is_empty() {
            info!(event = "run.skipped", reason = "labels removed before execution");
            return Ok(RunResult::skipped(REASON_NO_TARGETS));
        }

        validate_targets(&targets)?;

        let commit = pr.source_commit().ok_or(BackportError::MissingSourceCommit)?;
        let source = Source {
            owner,
            repo,
            pr: &pr,
            commit,
        };

        let mut plan = self.evaluate_targets(&source, targets).await?;

        if !plan.iter().any(|t| t.status == TargetStatus::Pending) {
            return Ok(RunResult::with_targets(plan));
        }

        if self.config.dry_run {
            for result in plan.iter_mut().filter(|t| t.status == TargetStatus::Pending) {
                result.settle(TargetStatus::DryRun, REASON_DRY_RUN);
                info!(event = "target.dry_run", branch = %result.target.branch);
            }
            return Ok(RunResult::with_targets(plan));
        }

        let executor = self
            .executor
            .clone()
            .ok_or(BackportError::MissingCollaborator("workspace executor"))?;

        let mut results = Vec::with_capacity(plan.len());
        for result in plan {
            if result.status == TargetStatus::Pending {
                results.push(self.execute_target(executor.as_ref(), &source, result).await);
            } else {
                results.push(result);
            }
        }

        Ok(RunResult::with_targets(results))
    }

    fn resolve_targets(&self, pr: &PrMetadata) -> Result<Vec<Target>> {
        let from_labels = collect_targets(&pr.labels, &self.config.label_prefix)?;
        Ok(merge_targets([from_labels, manual_targets(&self.config.target_branches)]))
    }

    /// Reason to skip when the done label for `branch` is already on the source PR.
    ///
    /// A failed lookup is logged and treated as absent.
    async fn done_label_reason(&self, source: &Source<'_>, branch: &str) -> Option<String> {
        let label = body::done_label(&self.config.label_prefix, branch);
        match self
            .remote
            .has_label(source.owner, source.repo, source.pr.number, &label)
            .await
        {
            Ok(true) => Some(format!("already cherry-picked (found {label} label)")),
            Ok(false) => None,
            Err(err) => {
                warn!(event = "done_label.check_failed", label = %label, error = %err, "continuing without done label check");
                None
            }
        }
    }

    async fn evaluate_targets(&self, source: &Source<'_>, targets: Vec<Target>) -> Result<Vec<TargetResult>> {
        let (owner, repo) = (source.owner, source.repo);
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let mut result = TargetResult::pending(target);
            let branch = result.target.branch.clone();

            if let Some(reason) = self.done_label_reason(source, &branch).await {
                info!(event = "target.skipped", branch = %branch, reason = %reason);
                result.settle(TargetStatus::SkippedExistingPr, reason);
                results.push(result);
                continue;
            }

            match self.remote.ensure_branch_exists(owner, repo, &branch).await {
                Ok(()) => {}
                Err(err) if err.is_branch_not_found() => {
                    warn!(event = "target.skipped", branch = %branch, reason = "missing branch");
                    result.settle(TargetStatus::SkippedMissingBranch, REASON_MISSING_BRANCH);
                    results.push(result);
                    continue;
                }
                Err(err) => return Err(BackportError::remote(format!("ensure branch {branch}"), err)),
            }

            let existing = self
                .remote
                .list_cherry_pick_prs(owner, repo, source.pr.number, &branch)
                .await
                .map_err(|err| BackportError::remote(format!("list cherry-pick prs for {branch}"), err))?;
            if let Some(existing) = existing.into_iter().next() {
                info!(event = "target.skipped", branch = %branch, existing_pr = %existing.url, reason = REASON_EXISTING_PR);
                result.settle(TargetStatus::SkippedExistingPr, REASON_EXISTING_PR);
                result.existing_pr = Some(existing);
                results.push(result);
                continue;
            }

            let present = self
                .remote
                .commit_exists_on_branch(owner, repo, source.commit, &branch)
                .await
                .map_err(|err| BackportError::remote(format!("check commit on {branch}"), err))?;
            if present {
                info!(event = "target.skipped", branch = %branch, commit = %source.commit, reason = REASON_COMMIT_PRESENT);
                result.settle(TargetStatus::SkippedCommitPresent, REASON_COMMIT_PRESENT);
            } else {
                debug!(event = "target.pending", branch = %branch);
            }
            results.push(result);
        }

        Ok(results)
    }

    async fn execute_target(
        &self,
        executor: &dyn WorkspaceExecutor,
        source: &Source<'_>,
        mut result: TargetResult,
    ) -> TargetResult {
        let branch = result.target.branch.clone();

        // Another run may have finished this target since evaluation.
        if let Some(reason) = self.done_label_reason(source, &branch).await {
            info!(event = "target.skipped", branch = %branch, reason = %reason);
            result.settle(TargetStatus::SkippedExistingPr, reason);
            return result;
        }

        let mut workspace = match executor.prepare(source.owner, source.repo).await {
            Ok(workspace) => workspace,
            Err(err) => {
                warn!(event = "target.failed", branch = %branch, error = %err, "prepare workspace failed");
                return result.fail(format!("prepare workspace: {err}"));
            }
        };

        let result = self.execute_in(workspace.as_mut(), source, result).await;

        if let Err(err) = workspace.cleanup().await {
            warn!(event = "workspace.cleanup_failed", branch = %branch, error = %err);
        }
        result
    }

    async fn execute_in(&self, workspace: &mut dyn Workspace, source: &Source<'_>, result: TargetResult) -> TargetResult {
        let branch = result.target.branch.clone();
        let head = branch_name_for(&branch, source.pr.number);

        if let Err(err) = workspace.checkout_branch(&branch).await {
            return result.fail(format!("checkout target branch {branch}: {err}"));
        }
        if let Err(err) = workspace.create_branch_from(&head, &branch).await {
            return result.fail(format!("create branch {head}: {err}"));
        }
        if let Err(err) = workspace.checkout_branch(&head).await {
            return result.fail(format!("checkout cherry-pick branch {head}: {err}"));
        }

        match workspace.cherry_pick(source.commit).await {
            Ok(()) => self.finish_clean(workspace, source, result, &head).await,
            Err(err) => {
                if let Err(abort) = workspace.abort_cherry_pick().await {
                    warn!(event = "cherry_pick.abort_failed", branch = %branch, error = %abort);
                }
                match self.config.conflict_strategy {
                    ConflictStrategy::Fail => {
                        warn!(event = "target.failed", branch = %branch, error = %err, "cherry-pick failed");
                        result.fail(format!("cherry-pick commit {}: {err}", source.commit))
                    }
                    ConflictStrategy::PlaceholderPr => {
                        self.finish_placeholder(workspace, source, result, &head, err).await
                    }
                }
            }
        }
    }

    async fn finish_clean(
        &self,
        workspace: &mut dyn Workspace,
        source: &Source<'_>,
        mut result: TargetResult,
        head: &str,
    ) -> TargetResult {
        if let Err(err) = workspace.push_branch(head).await {
            return result.fail(format!("push cherry-pick branch {head}: {err}"));
        }

        let request = body::create_request(source.pr, &result.target, head, &self.config.label_prefix);
        let created = match self.remote.create_pull_request(source.owner, source.repo, request).await {
            Ok(created) => created,
            Err(err) => return result.fail(format!("create pull request: {err}")),
        };

        info!(
            event = "target.succeeded",
            base_branch = %result.target.branch,
            head_branch = %head,
            pr_number = created.number,
            pr_url = %created.url,
        );
        result.settle(TargetStatus::Succeeded, REASON_CREATED);
        result.created_pr = Some(created);
        self.add_done_label(source, &result.target.branch).await;
        result
    }

    async fn finish_placeholder(
        &self,
        workspace: &mut dyn Workspace,
        source: &Source<'_>,
        mut result: TargetResult,
        head: &str,
        conflict: GitError,
    ) -> TargetResult {
        let branch = result.target.branch.clone();
        let pr_number = source.pr.number;

        let message = body::placeholder_commit_message(pr_number, &branch);
        if let Err(err) = workspace.commit_allow_empty(&message).await {
            return result.fail(format!("placeholder commit failed after conflict ({conflict}): {err}"));
        }
        if let Err(err) = workspace.push_branch(head).await {
            return result.fail(format!(
                "push placeholder branch {head} failed after conflict ({conflict}): {err}"
            ));
        }

        let mut request = body::create_request(source.pr, &result.target, head, &self.config.label_prefix);
        request.body = body::decorate_placeholder_body(&request.body, pr_number, &branch, &conflict.to_string());
        let created = match self.remote.create_pull_request(source.owner, source.repo, request).await {
            Ok(created) => created,
            Err(err) => {
                return result.fail(format!("create placeholder pull request failed ({conflict}): {err}"));
            }
        };

        warn!(
            event = "target.placeholder_pr",
            base_branch = %branch,
            head_branch = %head,
            pr_number = created.number,
            pr_url = %created.url,
            error = %conflict,
        );
        result.settle(
            TargetStatus::PlaceholderPr,
            format!("cherry-pick conflict: placeholder PR opened ({conflict})"),
        );
        result.created_pr = Some(created);
        self.add_done_label(source, &branch).await;
        result
    }

    async fn add_done_label(&self, source: &Source<'_>, branch: &str) {
        let label = body::done_label(&self.config.label_prefix, branch);
        match self
            .remote
            .add_label(source.owner, source.repo, source.pr.number, &label)
            .await
        {
            Ok(()) => info!(event = "done_label.added", label = %label, source_pr = source.pr.number),
            Err(err) => warn!(event = "done_label.add_failed", label = %label, source_pr = source.pr.number, error = %err),
        }
    }
}
