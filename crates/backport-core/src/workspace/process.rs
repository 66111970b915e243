//! Subprocess execution with cancellation and deadlines.
//!
//! Every child is spawned as the leader of its own process group so that
//! cancelling or timing out kills helpers it started (`git-remote-https`,
//! `gpg-agent`, ...) along with it.

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{GitError, GitResult};

/// A fully specified subprocess invocation.
pub(crate) struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub envs: &'a [(String, String)],
    /// Arguments as they may appear in logs and errors.
    pub display_args: &'a [String],
}

/// Run `invocation` to completion and return its combined output.
///
/// Resolves to [`GitError::Cancelled`] when `cancel` fires and to
/// [`GitError::TimedOut`] when `deadline` passes first; in both cases the
/// whole process group is killed before returning.
pub(crate) async fn run(
    invocation: Invocation<'_>,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> GitResult<String> {
    let mut command = Command::new(invocation.program);
    command
        .args(invocation.args)
        .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    debug!(program = invocation.program, args = ?invocation.display_args, "spawning subprocess");

    let child = command.spawn().map_err(|source| GitError::Spawn {
        program: invocation.program.to_string(),
        source,
    })?;
    let mut group = ProcessGroup::new(child.id());

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GitError::Cancelled),
        _ = expired => return Err(GitError::TimedOut),
        output = child.wait_with_output() => output?,
    };
    group.disarm();

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(GitError::Command {
            args: invocation.display_args.to_vec(),
            status: output.status.code(),
            output: combined,
        })
    }
}

/// Kills the child's process group on drop unless disarmed.
struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Ok(raw) = i32::try_from(pid) {
                if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                    debug!(pid, error = %err, "process group already gone");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;
    }
}
