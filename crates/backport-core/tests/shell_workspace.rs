//! ShellExecutor against real git repositories and scripted git stand-ins.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use backport_core::workspace::{RemoteUrl, ShellExecutor, WorkspaceExecutor};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Seed", "-c", "user.email=seed@example.com", "-c", "commit.gpgsign=false"])
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn commit_file(dir: &Path, file: &str, contents: &str, message: &str) -> String {
    std::fs::write(dir.join(file), contents).unwrap();
    git(dir, &["add", file]);
    git(dir, &["commit", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

/// A bare `acme/widgets` remote with `main` and `release/v1`, plus a seed clone.
struct Fixture {
    root: TempDir,
    seed: PathBuf,
    bare: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let bare = root.path().join("remotes/acme/widgets.git");
        std::fs::create_dir_all(&bare).unwrap();
        git(&bare, &["init", "--bare", "-b", "main"]);

        let seed = root.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "-b", "main"]);
        git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);
        commit_file(&seed, "lib.txt", "alpha\nbeta\n", "initial");
        git(&seed, &["push", "origin", "main"]);
        git(&seed, &["push", "origin", "main:release/v1"]);

        Self { root, seed, bare }
    }

    fn executor(&self) -> ShellExecutor {
        let template = format!("{}/remotes/{{owner}}/{{repo}}.git", self.root.path().display());
        ShellExecutor::new()
            .with_remote_url(RemoteUrl::Template(template))
            .with_base_dir(self.root.path().join("work"))
            .with_identity("Backport Bot", "bot@example.com")
            .with_network_retry_delay(Duration::from_millis(10))
    }

    fn remote_git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .arg("--git-dir")
            .arg(&self.bare)
            .args(args)
            .output()
            .unwrap();
        assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).to_string()
    }

    fn remote_show(&self, spec: &str) -> String {
        self.remote_git(&["show", spec])
    }

    fn workspaces_left(&self) -> usize {
        std::fs::read_dir(self.root.path().join("work"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// An executable script standing in for `git`.
fn fake_git(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-git");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn clean_cherry_pick_is_pushed_to_the_remote() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let fix = commit_file(&fx.seed, "lib.txt", "alpha\nbeta fixed\n", "fix beta");
    git(&fx.seed, &["push", "origin", "main"]);

    let executor = fx.executor();
    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    ws.checkout_branch("release/v1").await.unwrap();
    ws.create_branch_from("cherry-pick/release/v1/pr-42", "release/v1").await.unwrap();
    ws.checkout_branch("cherry-pick/release/v1/pr-42").await.unwrap();
    ws.cherry_pick(&fix).await.unwrap();
    ws.push_branch("cherry-pick/release/v1/pr-42").await.unwrap();
    ws.cleanup().await.unwrap();

    assert_eq!(
        fx.remote_show("cherry-pick/release/v1/pr-42:lib.txt"),
        "alpha\nbeta fixed\n"
    );
    assert_eq!(fx.remote_show("release/v1:lib.txt"), "alpha\nbeta\n");
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn conflicting_cherry_pick_can_be_aborted_and_replaced_by_placeholder() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let fix = commit_file(&fx.seed, "lib.txt", "alpha\nbeta from main\n", "main change");
    git(&fx.seed, &["push", "origin", "main"]);
    git(&fx.seed, &["fetch", "origin"]);
    git(&fx.seed, &["checkout", "-b", "release/v1", "origin/release/v1"]);
    commit_file(&fx.seed, "lib.txt", "alpha\nbeta from release\n", "release change");
    git(&fx.seed, &["push", "origin", "release/v1"]);

    let executor = fx.executor();
    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    let head = "cherry-pick/release/v1/pr-7";
    ws.checkout_branch("release/v1").await.unwrap();
    ws.create_branch_from(head, "release/v1").await.unwrap();
    ws.checkout_branch(head).await.unwrap();

    let err = ws.cherry_pick(&fix).await.unwrap_err();
    assert!(err.to_string().contains(&format!("git cherry-pick {fix}")));
    assert!(err.output().is_some_and(|out| out.contains("CONFLICT")));

    ws.abort_cherry_pick().await.unwrap();
    // A second abort has nothing to abort.
    ws.abort_cherry_pick().await.unwrap();

    ws.commit_allow_empty("Placeholder cherry-pick for #7 into release/v1").await.unwrap();
    ws.push_branch(head).await.unwrap();
    ws.cleanup().await.unwrap();

    assert_eq!(fx.remote_show(&format!("{head}:lib.txt")), "alpha\nbeta from release\n");
    let log = fx.remote_git(&["log", "-1", "--format=%s", head]);
    assert!(log.starts_with("Placeholder cherry-pick for #7 into release/v1"));
}

#[tokio::test]
async fn merge_commit_is_picked_against_first_parent() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.seed, &["checkout", "-b", "feature"]);
    commit_file(&fx.seed, "feature.txt", "new feature\n", "add feature");
    git(&fx.seed, &["checkout", "main"]);
    commit_file(&fx.seed, "other.txt", "unrelated\n", "unrelated main change");
    git(&fx.seed, &["merge", "--no-ff", "feature", "-m", "Merge feature"]);
    let merge = git(&fx.seed, &["rev-parse", "HEAD"]);
    git(&fx.seed, &["push", "origin", "main"]);

    let executor = fx.executor();
    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    let head = "cherry-pick/release/v1/pr-9";
    ws.checkout_branch("release/v1").await.unwrap();
    ws.create_branch_from(head, "release/v1").await.unwrap();
    ws.checkout_branch(head).await.unwrap();
    ws.cherry_pick(&merge).await.unwrap();
    ws.push_branch(head).await.unwrap();
    ws.cleanup().await.unwrap();

    assert_eq!(fx.remote_show(&format!("{head}:feature.txt")), "new feature\n");
}

#[tokio::test]
async fn create_branch_from_resets_an_existing_branch() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.seed, &["push", "origin", "main:cherry-pick/release/v1/pr-1"]);

    let executor = fx.executor();
    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    ws.checkout_branch("cherry-pick/release/v1/pr-1").await.unwrap();
    ws.checkout_branch("release/v1").await.unwrap();
    ws.create_branch_from("cherry-pick/release/v1/pr-1", "release/v1").await.unwrap();
    ws.cleanup().await.unwrap();
}

#[tokio::test]
async fn checkout_of_unknown_branch_fails_with_step_context() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let executor = fx.executor();
    let mut ws = executor.prepare("acme", "widgets").await.unwrap();

    let err = ws.checkout_branch("release/v404").await.unwrap_err();
    assert!(err.to_string().starts_with("git checkout release/v404"));
    ws.cleanup().await.unwrap();
}

#[tokio::test]
async fn network_commands_are_retried_then_reported() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let script = fake_git(
        dir.path(),
        &format!(
            "echo attempt >> {}\necho 'fatal: unable to access remote: Connection reset' >&2\nexit 128",
            counter.display()
        ),
    );

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_network_retries(2)
        .with_network_retry_delay(Duration::from_millis(5));

    let err = executor.prepare("acme", "widgets").await.err().expect("prepare should fail");

    assert!(err.to_string().starts_with("git clone"));
    assert!(err.output().is_some_and(|out| out.contains("Connection reset")));
    let attempts = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(attempts.lines().count(), 3);
}

#[tokio::test]
async fn partial_clone_rejection_falls_back_to_full_clone() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls");
    let script = fake_git(
        dir.path(),
        &format!(
            "echo \"$*\" >> {log}\ncase \"$*\" in\n  *--filter*) echo 'fatal: filtering not supported by server' >&2; exit 128 ;;\nesac\nexit 0",
            log = log.display()
        ),
    );

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_network_retries(0);

    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    ws.cleanup().await.unwrap();

    let calls = std::fs::read_to_string(&log).unwrap();
    let clones: Vec<&str> = calls.lines().filter(|l| l.starts_with("clone")).collect();
    assert_eq!(clones.len(), 2);
    assert!(clones[0].contains("--filter=blob:none"));
    assert!(!clones[1].contains("--filter"));
}

#[tokio::test]
async fn hanging_network_command_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_git(dir.path(), "exec sleep 30");

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_network_retries(3)
        .with_network_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = executor.prepare("acme", "widgets").await.err().expect("prepare should fail");

    assert!(err.is_timed_out());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancellation_kills_running_git() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_git(dir.path(), "sleep 30\nexit 0");
    let cancel = CancellationToken::new();

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = executor.prepare("acme", "widgets").await.err().expect("prepare should fail");

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn already_cancelled_executor_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");
    let script = fake_git(dir.path(), &format!("echo attempt >> {}", counter.display()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_cancellation(cancel);

    let err = executor.prepare("acme", "widgets").await.err().expect("prepare should fail");

    assert!(err.is_cancelled());
    assert!(!counter.exists());
}

#[tokio::test]
async fn token_never_appears_in_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_git(dir.path(), "echo \"fatal: could not read from $4\" >&2\nexit 128");

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_remote_url(RemoteUrl::Host("https://github.test".into()))
        .with_token("ghs_s3cr3t")
        .with_network_retries(0);

    let err = executor.prepare("acme", "widgets").await.err().expect("prepare should fail");
    let rendered = err.to_string();

    assert!(rendered.contains("x-access-token:***@github.test/acme/widgets.git"), "{rendered}");
    assert!(!rendered.contains("ghs_s3cr3t"));
    assert!(!format!("{executor:?}").contains("ghs_s3cr3t"));
}

/// Cherry-picks `commit` through a scripted git whose `rev-list --parents` prints `parents`.
async fn cherry_pick_with_parents(commit: &str, parents: &str) -> String {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls");
    let script = fake_git(
        dir.path(),
        &format!(
            "echo \"$*\" >> {log}\ncase \"$*\" in\n  *rev-list*--parents*) echo '{commit} {parents}' ;;\nesac\nexit 0",
            log = log.display()
        ),
    );

    let executor = ShellExecutor::new()
        .with_git_binary(script.to_string_lossy())
        .with_base_dir(dir.path().join("work"))
        .with_network_retries(0);

    let mut ws = executor.prepare("acme", "widgets").await.unwrap();
    ws.cherry_pick(commit).await.unwrap();
    ws.cleanup().await.unwrap();

    std::fs::read_to_string(&log).unwrap()
}

#[tokio::test]
async fn single_parent_commit_is_picked_without_mainline_flag() {
    let calls = cherry_pick_with_parents("4f2c1e9d0b", "a1b2c3").await;

    assert!(calls.contains("rev-list --parents -n 1 4f2c1e9d0b"), "{calls}");
    assert!(calls.lines().any(|l| l.ends_with("cherry-pick 4f2c1e9d0b")), "{calls}");
    assert!(!calls.contains("cherry-pick -m"), "{calls}");
}

#[tokio::test]
async fn two_parent_commit_is_picked_with_mainline_one() {
    let calls = cherry_pick_with_parents("4f2c1e9d0b", "a1b2c3 d4e5f6").await;

    assert!(calls.lines().any(|l| l.ends_with("cherry-pick -m 1 4f2c1e9d0b")), "{calls}");
    assert!(!calls.lines().any(|l| l.ends_with("cherry-pick 4f2c1e9d0b")), "{calls}");
}
