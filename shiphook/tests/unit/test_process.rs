//! Process runner tests

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use shiphook::deploy::process::{ProcessRunner, ProcessStatus};
use tempfile::TempDir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_captures_stdout_and_stderr() {
    let dir = TempDir::new().unwrap();
    let runner = ProcessRunner::default();

    let outcome = runner
        .run("sh", &args(&["-c", "echo out; echo err >&2"]), dir.path())
        .await;

    assert_eq!(outcome.status, ProcessStatus::Exited { code: Some(0) });
    assert_eq!(outcome.stdout, "out\n");
    assert_eq!(outcome.stderr, "err\n");
    assert!(outcome.success());
    assert_eq!(outcome.error_message(), None);
}

#[tokio::test]
async fn test_non_zero_exit_code_is_preserved() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::default()
        .run("sh", &args(&["-c", "exit 7"]), dir.path())
        .await;

    assert_eq!(outcome.exit_code(), Some(7));
    assert!(!outcome.success());
    assert!(!outcome.timed_out());
    assert_eq!(outcome.error_message(), None);
}

#[tokio::test]
async fn test_runs_in_working_directory() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::default()
        .run("pwd", &[], dir.path())
        .await;

    let reported = std::fs::canonicalize(outcome.stdout.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let dir = TempDir::new().unwrap();
    let runner = ProcessRunner::new(Duration::from_secs(5));

    // `cat` would block forever on an open stdin.
    let outcome = runner.run("cat", &[], dir.path()).await;

    assert_eq!(outcome.exit_code(), Some(0));
    assert_eq!(outcome.stdout, "");
}

#[tokio::test]
async fn test_extra_environment() {
    let dir = TempDir::new().unwrap();
    let runner = ProcessRunner::default().with_env("SHIPHOOK_TEST_VALUE", "bar");

    let outcome = runner
        .run("sh", &args(&["-c", "echo $SHIPHOOK_TEST_VALUE"]), dir.path())
        .await;

    assert_eq!(outcome.stdout, "bar\n");
}

#[tokio::test]
async fn test_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let outcome = ProcessRunner::default()
        .run("shiphook-definitely-not-installed", &[], dir.path())
        .await;

    assert_eq!(outcome.exit_code(), None);
    assert!(!outcome.timed_out());
    let message = outcome.spawn_error().unwrap();
    assert!(message.contains("shiphook-definitely-not-installed"));
    assert_eq!(outcome.error_message().as_deref(), Some(message));
}

#[tokio::test]
async fn test_timeout_kills_the_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let runner = ProcessRunner::new(Duration::from_secs(1));

    let started = Instant::now();
    let outcome = runner
        .run(
            "sh",
            &args(&["-c", "echo started; echo $$ > pid; exec sleep 30"]),
            dir.path(),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.timed_out());
    assert_eq!(outcome.exit_code(), None);
    assert!(outcome.error_message().unwrap().contains("timed out"));
    assert_eq!(outcome.stdout, "started\n");

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(!is_running(pid.trim()), "process {} still running", pid.trim());
}

#[tokio::test]
async fn test_timeout_kills_forked_children() {
    let dir = TempDir::new().unwrap();
    let runner = ProcessRunner::new(Duration::from_secs(1));

    // The shell is the direct child; `sleep` is its child and outlives a
    // kill aimed at the shell alone.
    let outcome = runner
        .run(
            "sh",
            &args(&["-c", "sleep 30 & echo $! > child_pid; wait"]),
            dir.path(),
        )
        .await;

    assert!(outcome.timed_out());
    let pid = std::fs::read_to_string(dir.path().join("child_pid")).unwrap();
    assert!(
        !still_running_after_grace(pid.trim()).await,
        "forked process {} still running after the timeout",
        pid.trim()
    );
}

#[tokio::test]
async fn test_background_job_of_finished_process_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let runner = ProcessRunner::new(Duration::from_secs(10));

    let outcome = runner
        .run(
            "sh",
            &args(&["-c", "sleep 5 >/dev/null 2>&1 & echo $! > child_pid"]),
            dir.path(),
        )
        .await;

    assert_eq!(outcome.exit_code(), Some(0));
    let pid = std::fs::read_to_string(dir.path().join("child_pid")).unwrap();
    assert!(is_running(pid.trim()));
    let _ = std::process::Command::new("kill").arg(pid.trim()).status();
}

/// Zombies count as gone: the kill landed, only reaping is left.
fn is_running(pid: &str) -> bool {
    let stat = Path::new("/proc").join(pid).join("stat");
    if Path::new("/proc/self/stat").exists() {
        return match std::fs::read_to_string(stat) {
            // The state letter follows the parenthesized command name.
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        };
    }
    std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn still_running_after_grace(pid: &str) -> bool {
    for _ in 0..50 {
        if !is_running(pid) {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
