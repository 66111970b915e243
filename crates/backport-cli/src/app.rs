//! Glue between the workflow event, the orchestrator and the run reports.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backport_core::event::SUPPORTED_EVENTS;
use backport_core::summary::{append_step_summary, upsert_summary_comment, write_outputs};
use backport_core::workspace::RemoteUrl;
use backport_core::{
    BackportError, Orchestrator, PullRequestEvent, RemoteService, RunResult, ShellExecutor, WorkspaceExecutor,
};
use backport_github::GitHubClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ActionConfig, RunnerContext};

/// How a run ended without error.
#[derive(Debug)]
pub enum Outcome {
    /// The event, action or actor is not handled.
    Ignored(String),
    /// The orchestrator ran; no target failed.
    Completed(RunResult),
}

/// Runs the action once for the current workflow event.
pub struct Runner {
    config: ActionConfig,
    context: RunnerContext,
    cancel: CancellationToken,
    remote: Option<Arc<dyn RemoteService>>,
    executor: Option<Arc<dyn WorkspaceExecutor>>,
}

impl Runner {
    pub fn new(config: ActionConfig, context: RunnerContext) -> Self {
        Self {
            config,
            context,
            cancel: CancellationToken::new(),
            remote: None,
            executor: None,
        }
    }

    /// Cancels in-flight git processes when fired.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use `remote` instead of a REST client built from the config.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteService>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Use `executor` instead of a shell executor built from the config.
    pub fn with_executor(mut self, executor: Arc<dyn WorkspaceExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Fails when the event cannot be read, the orchestration aborts or any
    /// target ends `failed`.
    pub async fn run(self) -> Result<Outcome> {
        let event = match self.load_event()? {
            Ok(event) => event,
            Err(reason) => return Ok(Outcome::Ignored(reason)),
        };

        let (remote, web_root) = match &self.remote {
            Some(remote) => (Arc::clone(remote), None),
            None => {
                let client = GitHubClient::new(self.config.github_config()).context("initialize github client")?;
                let web_root = client.web_root();
                (Arc::new(client) as Arc<dyn RemoteService>, Some(web_root))
            }
        };

        if self.config.require_org_membership {
            if let Some(reason) = self.check_membership(remote.as_ref(), &event.owner).await? {
                return Ok(Outcome::Ignored(reason));
            }
        }

        let mut orchestrator = Orchestrator::new(self.config.orchestrator_config(), Arc::clone(&remote));
        if let Some(executor) = self.executor.clone() {
            orchestrator = orchestrator.with_executor(executor);
        } else if !self.config.dry_run {
            orchestrator = orchestrator.with_executor(Arc::new(self.shell_executor(web_root)));
        }

        let result = orchestrator
            .process_pull_request(&event.owner, &event.repo, event.number)
            .await
            .context("process pull request")?;

        if result.skipped {
            info!(event = "run.skipped", reason = %result.skipped_reason, "skipping cherry-pick orchestration");
        }
        for target in &result.targets {
            info!(
                event = "target.evaluated",
                branch = %target.target.branch,
                status = %target.status,
                reason = %target.reason,
                "evaluated cherry-pick target"
            );
        }

        self.report(remote.as_ref(), &event, &result).await;

        let failed = result.failed_branches();
        if !failed.is_empty() {
            bail!("cherry-pick failed for {} target(s): {}", failed.len(), failed.join(", "));
        }
        Ok(Outcome::Completed(result))
    }

    /// The outer `Err` aborts the run; the inner one names why the event is ignored.
    fn load_event(&self) -> Result<std::result::Result<PullRequestEvent, String>> {
        let event_name = self.context.event_name();
        if !SUPPORTED_EVENTS.contains(&event_name) {
            info!(event = "run.ignored", event_name = %event_name, "ignoring unsupported event");
            return Ok(Err(format!("unsupported event {event_name:?}")));
        }

        let path = self
            .context
            .event_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .context("GITHUB_EVENT_PATH is required for pull_request events")?;
        let event = PullRequestEvent::from_path(path).context("parse pull request event")?;

        if !event.action().is_actionable() {
            info!(event = "run.ignored", action = %event.action, "ignoring unsupported pull_request action");
            return Ok(Err(format!("unsupported action {:?}", event.action)));
        }
        event.ensure_identified()?;
        Ok(Ok(event))
    }

    async fn check_membership(&self, remote: &dyn RemoteService, org: &str) -> Result<Option<String>> {
        let actor = self
            .context
            .actor()
            .context("GITHUB_ACTOR is required when require_org_membership is enabled")?;

        let member = remote
            .check_org_membership(org, actor)
            .await
            .map_err(|err| BackportError::remote("check org membership", err))
            .with_context(|| format!("check organization membership for {actor:?} in {org:?}"))?;

        if !member {
            info!(
                event = "run.ignored",
                actor = %actor,
                organization = %org,
                "actor is not a member of the repository owner organization"
            );
            return Ok(Some(format!("{actor} is not a member of {org}")));
        }
        debug!(actor = %actor, organization = %org, "organization membership check passed");
        Ok(None)
    }

    fn shell_executor(&self, web_root: Option<String>) -> ShellExecutor {
        let mut executor = ShellExecutor::new()
            .with_token(self.config.github_token.clone())
            .with_identity(self.config.git_user_name.clone(), self.config.git_user_email.clone())
            .with_cancellation(self.cancel.clone());
        if let Some(root) = web_root {
            executor = executor.with_remote_url(RemoteUrl::Host(root));
        }
        if let Some(signing) = self.config.signing.clone() {
            executor = executor.with_signing(signing);
        }
        executor
    }

    /// Step summary, outputs and the PR comment. Failures only warn.
    async fn report(&self, remote: &dyn RemoteService, event: &PullRequestEvent, result: &RunResult) {
        if let Some(path) = self.context.step_summary() {
            if let Err(err) = append_step_summary(path, result) {
                warn!(event = "report.step_summary_failed", error = %err, "failed to write step summary");
            }
        }
        if let Some(path) = self.context.output_file() {
            if let Err(err) = write_outputs(path, result) {
                warn!(event = "report.outputs_failed", error = %err, "failed to write action outputs");
            }
        }
        match upsert_summary_comment(remote, &event.owner, &event.repo, event.number, result).await {
            Ok(upsert) => debug!(event = "report.comment", outcome = ?upsert, "summary comment upserted"),
            Err(err) => warn!(event = "report.comment_failed", error = %err, "failed to post pull request comment"),
        }
    }
}
