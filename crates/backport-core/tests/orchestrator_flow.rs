//! End-to-end orchestrator behaviour against in-memory collaborators.

use std::sync::Arc;

use backport_core::fakes::{MemoryRemote, RecordingExecutor, WorkspaceOp};
use backport_core::remote::{PrMetadata, PrRef, RemoteError, RemoteService};
use backport_core::workspace::WorkspaceExecutor;
use backport_core::{
    BackportError, ConflictStrategy, Orchestrator, OrchestratorConfig, RunResult, TargetStatus,
};

const OWNER: &str = "acme";
const REPO: &str = "widgets";
const NUMBER: u64 = 42;
const MERGE_SHA: &str = "4f2c1e9d0b";

fn merged_pr(labels: &[&str]) -> PrMetadata {
    PrMetadata {
        owner: OWNER.into(),
        repo: REPO.into(),
        number: NUMBER,
        title: "Fix widget overflow".into(),
        body: "Fixes #41".into(),
        merge_commit_sha: MERGE_SHA.into(),
        head_sha: "a1b2c3".into(),
        head_ref: "fix-overflow".into(),
        head_owner: OWNER.into(),
        head_repo: REPO.into(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        assignees: vec!["octocat".into()],
        is_merged: true,
        is_from_fork: false,
    }
}

fn orchestrator(
    config: OrchestratorConfig,
    remote: &Arc<MemoryRemote>,
    executor: &RecordingExecutor,
) -> Orchestrator {
    Orchestrator::new(config, Arc::clone(remote) as Arc<dyn RemoteService>)
        .with_executor(Arc::new(executor.clone()) as Arc<dyn WorkspaceExecutor>)
}

async fn run(config: OrchestratorConfig, remote: &Arc<MemoryRemote>, executor: &RecordingExecutor) -> RunResult {
    orchestrator(config, remote, executor)
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .expect("run should complete")
}

fn statuses(result: &RunResult) -> Vec<(&str, TargetStatus)> {
    result
        .targets
        .iter()
        .map(|t| (t.target.branch.as_str(), t.status))
        .collect()
}

#[tokio::test]
async fn unmerged_pull_request_is_skipped() {
    let mut pr = merged_pr(&["cherry-pick/release/v1"]);
    pr.is_merged = false;
    let remote = Arc::new(MemoryRemote::new().with_pull_request(pr));
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert!(result.skipped);
    assert_eq!(result.skipped_reason, "not merged");
    assert_eq!(executor.prepare_count(), 0);
}

#[tokio::test]
async fn fork_pull_request_is_skipped_with_guidance() {
    let mut pr = merged_pr(&["cherry-pick/release/v1"]);
    pr.is_from_fork = true;
    pr.head_owner = "contributor".into();
    let remote = Arc::new(MemoryRemote::new().with_pull_request(pr));

    let result = run(OrchestratorConfig::default(), &remote, &RecordingExecutor::new()).await;

    assert!(result.skipped);
    assert!(result.skipped_reason.contains("fork"));
    assert!(result.skipped_reason.contains("create a branch in the base repository"));
}

#[tokio::test]
async fn no_matching_labels_is_skipped() {
    let remote = Arc::new(MemoryRemote::new().with_pull_request(merged_pr(&["bug"])));

    let result = run(OrchestratorConfig::default(), &remote, &RecordingExecutor::new()).await;

    assert!(result.skipped);
    assert_eq!(result.skipped_reason, "no targets");
    assert_eq!(remote.call_count("get_pull_request"), 1);
}

#[tokio::test]
async fn labels_removed_before_refresh_skip_the_run() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_pull_request(merged_pr(&["bug"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert!(result.skipped);
    assert_eq!(result.skipped_reason, "no targets");
    assert_eq!(remote.call_count("get_pull_request"), 2);
    assert_eq!(remote.call_count("ensure_branch_exists"), 0);
}

#[tokio::test]
async fn duplicate_labels_collapse_into_one_dry_run_target() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v0.25", "cherry-pick/release/v0.25"]))
            .with_branch("release/v0.25"),
    );
    let executor = RecordingExecutor::new();
    let config = OrchestratorConfig {
        dry_run: true,
        ..Default::default()
    };

    let result = run(config, &remote, &executor).await;

    assert!(!result.skipped);
    assert_eq!(statuses(&result), vec![("release/v0.25", TargetStatus::DryRun)]);
    assert_eq!(result.targets[0].reason, "dry run enabled");
    assert!(executor.ops().is_empty());
    assert!(remote.created_prs().is_empty());
    assert!(remote.added_labels().is_empty());
}

#[tokio::test]
async fn dry_run_does_not_require_an_executor() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let config = OrchestratorConfig {
        dry_run: true,
        ..Default::default()
    };

    let result = Orchestrator::new(config, Arc::clone(&remote) as Arc<dyn RemoteService>)
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap();

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::DryRun)]);
}

#[tokio::test]
async fn missing_executor_is_an_error_for_real_runs() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );

    let err = Orchestrator::new(OrchestratorConfig::default(), Arc::clone(&remote) as Arc<dyn RemoteService>)
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap_err();

    assert!(matches!(err, BackportError::MissingCollaborator(_)));
}

#[tokio::test]
async fn successful_cherry_pick_opens_pr_and_adds_done_label() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1", "bug", "Cherry-Pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Succeeded)]);
    let created = result.targets[0].created_pr.as_ref().expect("created pr");
    assert_eq!(created.head_branch, "cherry-pick/release/v1/pr-42");
    assert_eq!(created.base_branch, "release/v1");

    assert_eq!(
        executor.ops(),
        vec![
            WorkspaceOp::Prepare {
                owner: OWNER.into(),
                repo: REPO.into()
            },
            WorkspaceOp::CheckoutBranch("release/v1".into()),
            WorkspaceOp::CreateBranchFrom {
                branch: "cherry-pick/release/v1/pr-42".into(),
                from: "release/v1".into()
            },
            WorkspaceOp::CheckoutBranch("cherry-pick/release/v1/pr-42".into()),
            WorkspaceOp::CherryPick(MERGE_SHA.into()),
            WorkspaceOp::PushBranch("cherry-pick/release/v1/pr-42".into()),
            WorkspaceOp::Cleanup,
        ]
    );

    let requests = remote.created_prs();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.title, "[release/v1] Fix widget overflow");
    assert!(request
        .body
        .lines()
        .any(|l| l == "<!-- cherry-pick-of: acme/widgets#42 -> release/v1 -->"));
    assert!(request.body.contains("Fixes #41"));
    assert_eq!(request.labels, vec!["bug".to_string()]);
    assert_eq!(request.assignees, vec!["octocat".to_string()]);

    assert_eq!(remote.added_labels(), vec![(NUMBER, "cherry-pick/done/release/v1".to_string())]);
}

#[tokio::test]
async fn second_run_is_idempotent_via_done_label() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let first = RecordingExecutor::new();
    let result = run(OrchestratorConfig::default(), &remote, &first).await;
    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Succeeded)]);

    let second = RecordingExecutor::new();
    let result = run(OrchestratorConfig::default(), &remote, &second).await;

    // The done label matches the trigger prefix too; it resolves to a branch that does not exist.
    assert_eq!(
        statuses(&result),
        vec![
            ("release/v1", TargetStatus::SkippedExistingPr),
            ("done/release/v1", TargetStatus::SkippedMissingBranch),
        ]
    );
    assert!(result.targets[0].reason.contains("cherry-pick/done/release/v1"));
    assert!(second.ops().is_empty());
    assert_eq!(remote.created_prs().len(), 1);
}

#[tokio::test]
async fn branch_under_done_is_a_regular_target() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/done/hotfix"]))
            .with_branch("done/hotfix"),
    );
    let config = OrchestratorConfig {
        dry_run: true,
        ..Default::default()
    };

    let result = Orchestrator::new(config, Arc::clone(&remote) as Arc<dyn RemoteService>)
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap();

    assert!(!result.skipped);
    assert_eq!(statuses(&result), vec![("done/hotfix", TargetStatus::DryRun)]);
}

#[tokio::test]
async fn missing_branch_is_never_executed() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v9", "cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(
        statuses(&result),
        vec![
            ("release/v9", TargetStatus::SkippedMissingBranch),
            ("release/v1", TargetStatus::Succeeded),
        ]
    );
    assert!(result.targets[0].reason.contains("ensure the release branch exists"));
    assert_eq!(executor.prepare_count(), 1);
}

#[tokio::test]
async fn missing_branch_alone_means_zero_prepares() {
    let remote = Arc::new(MemoryRemote::new().with_pull_request(merged_pr(&["cherry-pick/release/v9"])));
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v9", TargetStatus::SkippedMissingBranch)]);
    assert_eq!(executor.prepare_count(), 0);
}

#[tokio::test]
async fn existing_cherry_pick_pr_is_reported() {
    let existing = PrRef {
        url: "https://github.test/acme/widgets/pull/77".into(),
        number: 77,
        head_branch: "cherry-pick/release/v1/pr-42".into(),
        base_branch: "release/v1".into(),
    };
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1")
            .with_existing_pr(NUMBER, "release/v1", existing.clone()),
    );
    let executor = RecordingExecutor::new();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::SkippedExistingPr)]);
    assert_eq!(result.targets[0].reason, "cherry-pick PR already exists");
    assert_eq!(result.targets[0].existing_pr.as_ref(), Some(&existing));
    assert_eq!(executor.prepare_count(), 0);
}

#[tokio::test]
async fn commit_already_on_target_is_skipped() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1")
            .with_commit_on_branch(MERGE_SHA, "release/v1"),
    );

    let result = run(OrchestratorConfig::default(), &remote, &RecordingExecutor::new()).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::SkippedCommitPresent)]);
}

#[tokio::test]
async fn head_sha_is_used_when_merge_sha_is_missing() {
    let mut pr = merged_pr(&["cherry-pick/release/v1"]);
    pr.merge_commit_sha.clear();
    let remote = Arc::new(MemoryRemote::new().with_pull_request(pr).with_branch("release/v1"));
    let executor = RecordingExecutor::new();

    run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(executor.count(|op| *op == WorkspaceOp::CherryPick("a1b2c3".into())), 1);
}

#[tokio::test]
async fn missing_source_commit_aborts_the_run() {
    let mut pr = merged_pr(&["cherry-pick/release/v1"]);
    pr.merge_commit_sha.clear();
    pr.head_sha.clear();
    let remote = Arc::new(MemoryRemote::new().with_pull_request(pr).with_branch("release/v1"));

    let err = orchestrator(OrchestratorConfig::default(), &remote, &RecordingExecutor::new())
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap_err();

    assert!(matches!(err, BackportError::MissingSourceCommit));
}

#[tokio::test]
async fn invalid_target_branch_aborts_the_run() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release..v1"]))
            .with_branch("release..v1"),
    );
    let executor = RecordingExecutor::new();

    let err = orchestrator(OrchestratorConfig::default(), &remote, &executor)
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap_err();

    assert!(matches!(err, BackportError::InvalidTarget { .. }));
    assert_eq!(remote.call_count("ensure_branch_exists"), 0);
    assert_eq!(executor.prepare_count(), 0);
}

#[tokio::test]
async fn conflict_with_fail_strategy_creates_nothing() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new().with_conflict(MERGE_SHA);

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Failed)]);
    assert!(result.targets[0].reason.contains("CONFLICT"));
    assert!(remote.created_prs().is_empty());
    assert!(remote.added_labels().is_empty());
    assert_eq!(executor.count(|op| *op == WorkspaceOp::AbortCherryPick), 1);
    assert_eq!(executor.count(|op| matches!(op, WorkspaceOp::PushBranch(_))), 0);
    assert_eq!(executor.count(|op| *op == WorkspaceOp::Cleanup), 1);
    assert_eq!(result.failed_branches(), vec!["release/v1"]);
}

#[tokio::test]
async fn conflict_with_placeholder_strategy_opens_placeholder_pr() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new().with_conflict(MERGE_SHA);
    let config = OrchestratorConfig {
        conflict_strategy: ConflictStrategy::PlaceholderPr,
        ..Default::default()
    };

    let result = run(config, &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::PlaceholderPr)]);
    assert!(result.targets[0].reason.starts_with("cherry-pick conflict: placeholder PR opened"));
    assert_eq!(
        executor.count(|op| matches!(op, WorkspaceOp::CommitAllowEmpty(_))),
        1
    );
    assert!(executor
        .ops()
        .contains(&WorkspaceOp::CommitAllowEmpty("Placeholder cherry-pick for #42 into release/v1".into())));
    assert_eq!(executor.count(|op| matches!(op, WorkspaceOp::PushBranch(_))), 1);

    let requests = remote.created_prs();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].body.contains("encountered conflicts"));
    assert!(requests[0].body.contains("CONFLICT (content)"));
    assert!(requests[0].body.contains("<!-- cherry-pick-of: acme/widgets#42 -> release/v1 -->"));
    assert_eq!(remote.added_labels(), vec![(NUMBER, "cherry-pick/done/release/v1".to_string())]);
}

#[tokio::test]
async fn one_failed_target_does_not_stop_the_others() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1", "cherry-pick/release/v2"]))
            .with_branch("release/v1")
            .with_branch("release/v2"),
    );
    let executor = RecordingExecutor::new().with_push_failure("remote rejected");

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(
        statuses(&result),
        vec![("release/v1", TargetStatus::Failed), ("release/v2", TargetStatus::Failed)]
    );
    assert!(result.targets[0].reason.starts_with("push cherry-pick branch cherry-pick/release/v1/pr-42"));
    assert_eq!(executor.prepare_count(), 2);
    assert_eq!(executor.count(|op| *op == WorkspaceOp::Cleanup), 2);
}

#[tokio::test]
async fn prepare_failure_is_recorded_per_target() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new().with_prepare_failure("could not resolve host");

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Failed)]);
    assert!(result.targets[0].reason.starts_with("prepare workspace"));
    assert_eq!(executor.count(|op| *op == WorkspaceOp::Cleanup), 0);
}

#[tokio::test]
async fn cleanup_failure_does_not_change_outcome() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1"),
    );
    let executor = RecordingExecutor::new().with_cleanup_failure();

    let result = run(OrchestratorConfig::default(), &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Succeeded)]);
}

#[tokio::test]
async fn done_label_failures_are_tolerated() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1")
            .fail_on("has_label", RemoteError::retryable("list labels", Some(502), "bad gateway"))
            .fail_on("add_label", RemoteError::fatal("add label", Some(403), "forbidden")),
    );

    let result = run(OrchestratorConfig::default(), &remote, &RecordingExecutor::new()).await;

    assert_eq!(statuses(&result), vec![("release/v1", TargetStatus::Succeeded)]);
    assert_eq!(remote.created_prs().len(), 1);
}

#[tokio::test]
async fn evaluation_errors_abort_the_run() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .fail_on("ensure_branch_exists", RemoteError::retryable("get branch", Some(503), "unavailable")),
    );

    let err = orchestrator(OrchestratorConfig::default(), &remote, &RecordingExecutor::new())
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().starts_with("ensure branch release/v1"));
}

#[tokio::test]
async fn manual_targets_merge_with_labels() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&["cherry-pick/release/v1"]))
            .with_branch("release/v1")
            .with_branch("release/v2"),
    );
    let config = OrchestratorConfig {
        dry_run: true,
        target_branches: vec!["refs/heads/release/v2".into(), "release/v1".into(), " ".into()],
        ..Default::default()
    };

    let result = run(config, &remote, &RecordingExecutor::new()).await;

    assert_eq!(
        statuses(&result),
        vec![("release/v1", TargetStatus::DryRun), ("release/v2", TargetStatus::DryRun)]
    );
    assert_eq!(result.targets[0].target.source_label, "cherry-pick/release/v1");
    assert_eq!(result.targets[1].target.source_label, "input:refs/heads/release/v2");
}

#[tokio::test]
async fn manual_targets_apply_without_labels() {
    let remote = Arc::new(
        MemoryRemote::new()
            .with_pull_request(merged_pr(&[]))
            .with_branch("release/v3"),
    );
    let config = OrchestratorConfig {
        target_branches: vec!["release/v3".into()],
        ..Default::default()
    };
    let executor = RecordingExecutor::new();

    let result = run(config, &remote, &executor).await;

    assert_eq!(statuses(&result), vec![("release/v3", TargetStatus::Succeeded)]);
}

#[tokio::test]
async fn empty_label_prefix_is_a_configuration_error() {
    let remote = Arc::new(MemoryRemote::new().with_pull_request(merged_pr(&["cherry-pick/release/v1"])));
    let config = OrchestratorConfig {
        label_prefix: "  ".into(),
        ..Default::default()
    };

    let err = orchestrator(config, &remote, &RecordingExecutor::new())
        .process_pull_request(OWNER, REPO, NUMBER)
        .await
        .unwrap_err();

    assert!(matches!(err, BackportError::InvalidConfiguration(_)));
}
