//! Action inputs and runner context.
//!
//! Every input can be passed as a flag or through the GitHub Actions
//! `INPUT_*` environment variable. Empty values count as unset.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use backport_core::orchestrator::DEFAULT_LABEL_PREFIX;
use backport_core::telemetry::parse_level;
use backport_core::workspace::SigningConfig;
use backport_core::{ConflictStrategy, LogFormat, OrchestratorConfig};
use backport_github::GitHubConfig;
use clap::Args;
use tracing::Level;

pub const DEFAULT_GIT_USER_NAME: &str = "Backport Bot";
pub const DEFAULT_GIT_USER_EMAIL: &str = "backport-bot@users.noreply.github.com";

/// Raw action inputs as read from flags and environment.
#[derive(Args, Clone, Default)]
pub struct Inputs {
    /// Token used for the REST API and for pushing branches
    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Token injected by the workflow runner, used when no input token is set
    #[arg(long, env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    pub workflow_token: Option<String>,

    /// GitHub Enterprise API base URL
    #[arg(long, env = "INPUT_GITHUB_BASE_URL")]
    pub github_base_url: Option<String>,

    /// GitHub Enterprise upload URL
    #[arg(long, env = "INPUT_GITHUB_UPLOAD_URL")]
    pub github_upload_url: Option<String>,

    /// Prefix of labels that request a cherry-pick
    #[arg(long, env = "INPUT_LABEL_PREFIX")]
    pub label_prefix: Option<String>,

    /// Evaluate targets without touching git or opening pull requests
    #[arg(long, env = "INPUT_DRY_RUN", num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: Option<String>,

    /// Shorthand for `--log-level debug`
    #[arg(long, env = "INPUT_VERBOSE", num_args = 0..=1, default_missing_value = "true")]
    pub verbose: Option<String>,

    /// debug, info, warn or error
    #[arg(long, env = "INPUT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// text or json
    #[arg(long, env = "INPUT_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// fail or placeholder-pr
    #[arg(long, env = "INPUT_CONFLICT_STRATEGY")]
    pub conflict_strategy: Option<String>,

    /// Comma or newline separated branches targeted regardless of labels
    #[arg(long, env = "INPUT_TARGET_BRANCHES")]
    pub target_branches: Option<String>,

    #[arg(long, env = "INPUT_GIT_USER_NAME")]
    pub git_user_name: Option<String>,

    #[arg(long, env = "INPUT_GIT_USER_EMAIL")]
    pub git_user_email: Option<String>,

    /// ASCII-armored secret key used to sign cherry-pick commits
    #[arg(long, env = "INPUT_GIT_SIGNING_KEY", hide_env_values = true)]
    pub git_signing_key: Option<String>,

    #[arg(long, env = "INPUT_GIT_SIGNING_PASSPHRASE", hide_env_values = true)]
    pub git_signing_passphrase: Option<String>,

    /// Only act for actors who belong to the repository owner organization
    #[arg(
        long,
        env = "INPUT_REQUIRE_ORG_MEMBERSHIP",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub require_org_membership: Option<String>,
}

/// Workflow runner context.
#[derive(Args, Debug, Clone, Default)]
pub struct RunnerContext {
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event_name: Option<String>,

    /// JSON webhook payload of the triggering event
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    pub event_path: Option<PathBuf>,

    /// Login that triggered the workflow
    #[arg(long, env = "GITHUB_ACTOR")]
    pub actor: Option<String>,

    /// Markdown job summary file
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    pub step_summary: Option<PathBuf>,

    /// Step outputs file
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,
}

impl RunnerContext {
    pub fn event_name(&self) -> &str {
        self.event_name.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    pub fn step_summary(&self) -> Option<&PathBuf> {
        self.step_summary.as_ref().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn output_file(&self) -> Option<&PathBuf> {
        self.output_file.as_ref().filter(|p| !p.as_os_str().is_empty())
    }
}

/// Validated configuration for one run.
#[derive(Clone)]
pub struct ActionConfig {
    pub github_token: String,
    pub github_base_url: Option<String>,
    pub github_upload_url: Option<String>,
    pub label_prefix: String,
    pub dry_run: bool,
    pub log_level: Level,
    pub log_format: LogFormat,
    pub conflict_strategy: ConflictStrategy,
    pub target_branches: Vec<String>,
    pub git_user_name: String,
    pub git_user_email: String,
    pub signing: Option<SigningConfig>,
    pub require_org_membership: bool,
}

impl ActionConfig {
    pub fn from_inputs(inputs: Inputs) -> Result<Self> {
        let github_token = present(inputs.github_token)
            .or_else(|| present(inputs.workflow_token))
            .context("github token is required (set INPUT_GITHUB_TOKEN or GITHUB_TOKEN)")?;

        let github_base_url = present(inputs.github_base_url);
        let github_upload_url = present(inputs.github_upload_url);
        if github_base_url.is_some() != github_upload_url.is_some() {
            bail!("github base URL and upload URL must be provided together for GitHub Enterprise");
        }

        let dry_run = parse_bool("dry_run", inputs.dry_run.as_deref())?;
        let verbose = parse_bool("verbose", inputs.verbose.as_deref())?;
        let require_org_membership =
            parse_bool("require_org_membership", inputs.require_org_membership.as_deref())?;

        let log_level = if verbose {
            Level::DEBUG
        } else {
            parse_level(inputs.log_level.as_deref().unwrap_or_default())?
        };
        let log_format: LogFormat = inputs.log_format.as_deref().unwrap_or_default().parse()?;

        let conflict_strategy = match present(inputs.conflict_strategy) {
            Some(raw) => raw.parse::<ConflictStrategy>()?,
            None => ConflictStrategy::default(),
        };
        if conflict_strategy == ConflictStrategy::PlaceholderPr && dry_run {
            bail!("conflict strategy 'placeholder-pr' cannot be combined with dry run");
        }

        let signing = present(inputs.git_signing_key).map(|key| {
            let signing = SigningConfig::new(key);
            match present(inputs.git_signing_passphrase) {
                Some(passphrase) => signing.with_passphrase(passphrase),
                None => signing,
            }
        });

        Ok(Self {
            github_token,
            github_base_url,
            github_upload_url,
            label_prefix: present(inputs.label_prefix).unwrap_or_else(|| DEFAULT_LABEL_PREFIX.to_string()),
            dry_run,
            log_level,
            log_format,
            conflict_strategy,
            target_branches: parse_branch_list(inputs.target_branches.as_deref().unwrap_or_default()),
            git_user_name: present(inputs.git_user_name).unwrap_or_else(|| DEFAULT_GIT_USER_NAME.to_string()),
            git_user_email: present(inputs.git_user_email).unwrap_or_else(|| DEFAULT_GIT_USER_EMAIL.to_string()),
            signing,
            require_org_membership,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            label_prefix: self.label_prefix.clone(),
            conflict_strategy: self.conflict_strategy,
            dry_run: self.dry_run,
            target_branches: self.target_branches.clone(),
        }
    }

    pub fn github_config(&self) -> GitHubConfig {
        let config = GitHubConfig::new(self.github_token.clone());
        match (&self.github_base_url, &self.github_upload_url) {
            (Some(base), Some(upload)) => config.with_enterprise_urls(base.clone(), upload.clone()),
            _ => config,
        }
    }
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("github_token", &"***")
            .field("github_base_url", &self.github_base_url)
            .field("label_prefix", &self.label_prefix)
            .field("dry_run", &self.dry_run)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("conflict_strategy", &self.conflict_strategy)
            .field("target_branches", &self.target_branches)
            .field("git_user_name", &self.git_user_name)
            .field("git_user_email", &self.git_user_email)
            .field("signing", &self.signing)
            .field("require_org_membership", &self.require_org_membership)
            .finish_non_exhaustive()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Accepts the spellings GitHub Actions inputs commonly use. Unset is false.
pub fn parse_bool(name: &str, value: Option<&str>) -> Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("true" | "t" | "1" | "yes" | "y" | "on") => Ok(true),
        Some("false" | "f" | "0" | "no" | "n" | "off") => Ok(false),
        Some(other) => bail!("{name} must be a boolean, got {other:?}"),
    }
}

/// Split on commas and line breaks, dropping blanks.
pub fn parse_branch_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}
