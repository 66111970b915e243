//! Backport - label-driven cherry-pick pull requests
//!
//! Runs as a GitHub Actions step on `pull_request` / `pull_request_target`
//! events. Each `cherry-pick/<branch>` label on a merged pull request gets a
//! cherry-pick branch pushed and a pull request opened against `<branch>`.
//!
//! Inputs come from flags or the matching `INPUT_*` environment variables;
//! see `backport --help`.

use anyhow::{Context, Result};
use backport_core::init_tracing;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use backport_cli::{ActionConfig, Inputs, Outcome, Runner, RunnerContext};

#[derive(Parser)]
#[command(name = "backport")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Open cherry-pick pull requests for labelled merges", long_about = None)]
struct Cli {
    #[command(flatten)]
    inputs: Inputs,

    #[command(flatten)]
    context: RunnerContext,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ActionConfig::from_inputs(cli.inputs).context("load configuration")?;

    init_tracing(config.log_format, config.log_level);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(event = "run.interrupted", "interrupt received, cancelling git operations");
            on_signal.cancel();
        }
    });

    let outcome = Runner::new(config, cli.context)
        .with_cancellation(cancel)
        .run()
        .await?;

    match outcome {
        Outcome::Ignored(reason) => info!(event = "run.finished", reason = %reason, "nothing to do"),
        Outcome::Completed(result) => info!(
            event = "run.finished",
            targets = result.targets.len(),
            skipped = result.skipped,
            "cherry-pick run complete"
        ),
    }
    Ok(())
}
