//! In-memory fakes for the collaborator traits (testing only)
//!
//! [`MemoryRemote`] implements [`RemoteService`] over plain collections and
//! records every mutation. [`RecordingExecutor`] hands out workspaces that log
//! each git primitive instead of running it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::remote::{CreatePrRequest, IssueComment, PrMetadata, PrRef, RemoteError, RemoteResult, RemoteService};
use crate::workspace::{GitError, GitResult, Workspace, WorkspaceExecutor};

// ---------------------------------------------------------------------------
// MemoryRemote
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    /// Successive `get_pull_request` responses; the last one repeats.
    pulls: HashMap<u64, VecDeque<PrMetadata>>,
    branches: HashSet<String>,
    existing: HashMap<(u64, String), Vec<PrRef>>,
    commits: HashSet<(String, String)>,
    added_labels: Vec<(u64, String)>,
    members: HashSet<(String, String)>,
    comments: HashMap<u64, Vec<IssueComment>>,
    updated_comments: Vec<(u64, String)>,
    created: Vec<CreatePrRequest>,
    failures: HashMap<&'static str, RemoteError>,
    calls: Vec<&'static str>,
    next_number: u64,
    next_comment_id: u64,
}

/// In-memory hosting service.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `get_pull_request` response for `pr.number`.
    pub fn with_pull_request(self, pr: PrMetadata) -> Self {
        self.state
            .lock()
            .unwrap()
            .pulls
            .entry(pr.number)
            .or_default()
            .push_back(pr);
        self
    }

    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        self.state.lock().unwrap().branches.insert(branch.into());
        self
    }

    pub fn with_existing_pr(self, source_pr: u64, base: impl Into<String>, pr: PrRef) -> Self {
        self.state
            .lock()
            .unwrap()
            .existing
            .entry((source_pr, base.into()))
            .or_default()
            .push(pr);
        self
    }

    pub fn with_commit_on_branch(self, sha: impl Into<String>, branch: impl Into<String>) -> Self {
        self.state.lock().unwrap().commits.insert((sha.into(), branch.into()));
        self
    }

    pub fn with_org_member(self, org: impl Into<String>, user: impl Into<String>) -> Self {
        self.state.lock().unwrap().members.insert((org.into(), user.into()));
        self
    }

    pub fn with_comment(self, number: u64, comment: IssueComment) -> Self {
        self.state
            .lock()
            .unwrap()
            .comments
            .entry(number)
            .or_default()
            .push(comment);
        self
    }

    /// Make every call to `operation` (the trait method name) fail with `err`.
    pub fn fail_on(self, operation: &'static str, err: RemoteError) -> Self {
        self.state.lock().unwrap().failures.insert(operation, err);
        self
    }

    pub fn created_prs(&self) -> Vec<CreatePrRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn added_labels(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().added_labels.clone()
    }

    pub fn comments(&self, number: u64) -> Vec<IssueComment> {
        self.state
            .lock()
            .unwrap()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn updated_comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().updated_comments.clone()
    }

    /// Number of calls made to `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    fn enter(&self, operation: &'static str) -> RemoteResult<std::sync::MutexGuard<'_, RemoteState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        if let Some(err) = state.failures.get(operation).cloned() {
            return Err(err);
        }
        Ok(state)
    }
}

fn current_labels(state: &RemoteState, number: u64) -> Vec<String> {
    let mut labels = state
        .pulls
        .get(&number)
        .and_then(|queue| queue.front())
        .map(|pr| pr.labels.clone())
        .unwrap_or_default();
    for (pr, label) in &state.added_labels {
        if *pr == number && !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn get_pull_request(&self, owner: &str, repo: &str, number: u64) -> RemoteResult<PrMetadata> {
        let mut state = self.enter("get_pull_request")?;
        let added: Vec<String> = state
            .added_labels
            .iter()
            .filter(|(pr, _)| *pr == number)
            .map(|(_, label)| label.clone())
            .collect();
        let queue = state.pulls.get_mut(&number).ok_or_else(|| {
            RemoteError::fatal("get pull request", Some(404), format!("{owner}/{repo}#{number} not found"))
        })?;
        let mut pr = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        for label in added {
            if !pr.labels.contains(&label) {
                pr.labels.push(label);
            }
        }
        Ok(pr)
    }

    async fn ensure_branch_exists(&self, _owner: &str, _repo: &str, branch: &str) -> RemoteResult<()> {
        let state = self.enter("ensure_branch_exists")?;
        if state.branches.contains(branch) {
            Ok(())
        } else {
            Err(RemoteError::BranchNotFound {
                branch: branch.to_string(),
            })
        }
    }

    async fn list_cherry_pick_prs(
        &self,
        _owner: &str,
        _repo: &str,
        source_pr: u64,
        target_branch: &str,
    ) -> RemoteResult<Vec<PrRef>> {
        let state = self.enter("list_cherry_pick_prs")?;
        Ok(state
            .existing
            .get(&(source_pr, target_branch.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_exists_on_branch(
        &self,
        _owner: &str,
        _repo: &str,
        commit_sha: &str,
        branch: &str,
    ) -> RemoteResult<bool> {
        let state = self.enter("commit_exists_on_branch")?;
        Ok(state.commits.contains(&(commit_sha.to_string(), branch.to_string())))
    }

    async fn create_pull_request(&self, owner: &str, repo: &str, request: CreatePrRequest) -> RemoteResult<PrRef> {
        let mut state = self.enter("create_pull_request")?;
        state.next_number += 1;
        let number = 1000 + state.next_number;
        let created = PrRef {
            url: format!("https://github.test/{owner}/{repo}/pull/{number}"),
            number,
            head_branch: request.head.clone(),
            base_branch: request.base.clone(),
        };
        state.created.push(request);
        Ok(created)
    }

    async fn has_label(&self, _owner: &str, _repo: &str, number: u64, label: &str) -> RemoteResult<bool> {
        let state = self.enter("has_label")?;
        Ok(current_labels(&state, number).iter().any(|l| l.eq_ignore_ascii_case(label)))
    }

    async fn add_label(&self, _owner: &str, _repo: &str, number: u64, label: &str) -> RemoteResult<()> {
        let mut state = self.enter("add_label")?;
        state.added_labels.push((number, label.to_string()));
        Ok(())
    }

    async fn check_org_membership(&self, org: &str, user: &str) -> RemoteResult<bool> {
        let state = self.enter("check_org_membership")?;
        Ok(state.members.contains(&(org.to_string(), user.to_string())))
    }

    async fn comment_on_pull_request(&self, _owner: &str, _repo: &str, number: u64, body: &str) -> RemoteResult<()> {
        let mut state = self.enter("comment_on_pull_request")?;
        state.next_comment_id += 1;
        let id = state.next_comment_id;
        state.comments.entry(number).or_default().push(IssueComment {
            id,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn list_pull_request_comments(&self, _owner: &str, _repo: &str, number: u64) -> RemoteResult<Vec<IssueComment>> {
        let state = self.enter("list_pull_request_comments")?;
        Ok(state.comments.get(&number).cloned().unwrap_or_default())
    }

    async fn update_comment(&self, _owner: &str, _repo: &str, comment_id: u64, body: &str) -> RemoteResult<()> {
        let mut state = self.enter("update_comment")?;
        state.updated_comments.push((comment_id, body.to_string()));
        for comment in state.comments.values_mut().flatten() {
            if comment.id == comment_id {
                comment.body = body.to_string();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// A git primitive invoked on a [`RecordingExecutor`] workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceOp {
    Prepare { owner: String, repo: String },
    CheckoutBranch(String),
    CreateBranchFrom { branch: String, from: String },
    CherryPick(String),
    AbortCherryPick,
    CommitAllowEmpty(String),
    PushBranch(String),
    Cleanup,
}

#[derive(Debug, Default)]
struct ExecState {
    ops: Vec<WorkspaceOp>,
    prepare_failure: Option<String>,
    conflicts: HashSet<String>,
    push_failure: Option<String>,
    cleanup_failure: bool,
}

/// Executor whose workspaces record operations and fail on demand.
#[derive(Debug, Default, Clone)]
pub struct RecordingExecutor {
    state: Arc<Mutex<ExecState>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prepare_failure(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().prepare_failure = Some(message.into());
        self
    }

    /// Cherry-picking `commit` reports a merge conflict.
    pub fn with_conflict(self, commit: impl Into<String>) -> Self {
        self.state.lock().unwrap().conflicts.insert(commit.into());
        self
    }

    pub fn with_push_failure(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().push_failure = Some(message.into());
        self
    }

    pub fn with_cleanup_failure(self) -> Self {
        self.state.lock().unwrap().cleanup_failure = true;
        self
    }

    pub fn ops(&self) -> Vec<WorkspaceOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn count(&self, matches: impl Fn(&WorkspaceOp) -> bool) -> usize {
        self.state.lock().unwrap().ops.iter().filter(|op| matches(op)).count()
    }

    pub fn prepare_count(&self) -> usize {
        self.count(|op| matches!(op, WorkspaceOp::Prepare { .. }))
    }
}

fn command_failure(args: &[&str], output: &str) -> GitError {
    GitError::Command {
        args: args.iter().map(|a| a.to_string()).collect(),
        status: Some(1),
        output: output.to_string(),
    }
}

#[async_trait]
impl WorkspaceExecutor for RecordingExecutor {
    async fn prepare(&self, owner: &str, repo: &str) -> GitResult<Box<dyn Workspace>> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(WorkspaceOp::Prepare {
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
        if let Some(message) = &state.prepare_failure {
            return Err(GitError::step("git clone", command_failure(&["clone"], message)));
        }
        Ok(Box::new(RecordingWorkspace {
            state: Arc::clone(&self.state),
        }))
    }
}

struct RecordingWorkspace {
    state: Arc<Mutex<ExecState>>,
}

impl RecordingWorkspace {
    fn record(&self, op: WorkspaceOp) -> std::sync::MutexGuard<'_, ExecState> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(op);
        state
    }

    fn push_op(&self, op: WorkspaceOp) {
        self.state.lock().unwrap().ops.push(op);
    }
}

#[async_trait]
impl Workspace for RecordingWorkspace {
    async fn checkout_branch(&mut self, branch: &str) -> GitResult<()> {
        self.push_op(WorkspaceOp::CheckoutBranch(branch.to_string()));
        Ok(())
    }

    async fn create_branch_from(&mut self, branch: &str, from: &str) -> GitResult<()> {
        self.push_op(WorkspaceOp::CreateBranchFrom {
            branch: branch.to_string(),
            from: from.to_string(),
        });
        Ok(())
    }

    async fn cherry_pick(&mut self, commit: &str) -> GitResult<()> {
        let state = self.record(WorkspaceOp::CherryPick(commit.to_string()));
        if state.conflicts.contains(commit) {
            return Err(GitError::step(
                format!("git cherry-pick {commit}"),
                command_failure(
                    &["cherry-pick", commit],
                    "CONFLICT (content): Merge conflict in src/lib.rs\nerror: could not apply",
                ),
            ));
        }
        Ok(())
    }

    async fn abort_cherry_pick(&mut self) -> GitResult<()> {
        self.push_op(WorkspaceOp::AbortCherryPick);
        Ok(())
    }

    async fn commit_allow_empty(&mut self, message: &str) -> GitResult<()> {
        self.push_op(WorkspaceOp::CommitAllowEmpty(message.to_string()));
        Ok(())
    }

    async fn push_branch(&mut self, branch: &str) -> GitResult<()> {
        let state = self.record(WorkspaceOp::PushBranch(branch.to_string()));
        match &state.push_failure {
            Some(message) => Err(GitError::step(format!("git push {branch}"), command_failure(&["push"], message))),
            None => Ok(()),
        }
    }

    async fn cleanup(&mut self) -> GitResult<()> {
        let state = self.record(WorkspaceOp::Cleanup);
        if state.cleanup_failure {
            return Err(GitError::Io(std::io::Error::other("workspace busy")));
        }
        Ok(())
    }
}
