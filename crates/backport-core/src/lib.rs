//! Label-driven cherry-pick orchestration.
//!
//! A merged pull request carrying `cherry-pick/<branch>` labels is backported
//! to each named release branch by opening a cherry-pick pull request:
//!
//! - [`naming`]: deterministic, length-bounded cherry-pick branch names
//! - [`targets`]: target branches from labels and manual overrides
//! - [`workspace`]: ephemeral git clones driven through the `git` binary
//! - [`remote`]: the hosting-service boundary
//! - [`orchestrator`]: the per-target evaluation and execution state machine
//! - [`summary`]: step summary, action outputs and the summary comment

pub mod error;
pub mod event;
pub mod fakes;
pub mod naming;
pub mod orchestrator;
pub mod remote;
pub mod summary;
pub mod targets;
pub mod telemetry;
pub mod workspace;

pub use error::{BackportError, Result};
pub use event::{PullRequestAction, PullRequestEvent};
pub use naming::{branch_name_for, branch_name_with, BranchNamingOptions};
pub use orchestrator::{
    ConflictStrategy, Orchestrator, OrchestratorConfig, RunResult, TargetResult, TargetStatus,
};
pub use remote::{CreatePrRequest, IssueComment, PrMetadata, PrRef, RemoteError, RemoteService};
pub use targets::Target;
pub use telemetry::{init_tracing, LogFormat};
pub use workspace::{GitError, NoopExecutor, ShellExecutor, Workspace, WorkspaceExecutor};
