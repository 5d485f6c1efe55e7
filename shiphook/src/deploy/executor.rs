//! Pull-and-run deploy executor

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::deploy::command::CommandLine;
use crate::deploy::git::{GitPuller, SourcePuller};
use crate::deploy::process::ProcessRunner;

/// Aggregated result of one trigger's pull and run steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOutcome {
    /// True only if the deploy command exited with code 0
    pub success: bool,

    /// True if the pull completed without error
    pub pull_succeeded: bool,
    pub pull_stdout: String,
    pub pull_stderr: String,

    pub run_stdout: String,
    pub run_stderr: String,

    /// Absent when the command never produced an exit code
    pub run_exit_code: Option<i32>,

    /// Failure messages from the pull and the run, in order
    pub error: Option<String>,
}

impl DeployOutcome {
    fn push_error(&mut self, message: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(message);
            }
            None => self.error = Some(message.to_string()),
        }
    }
}

/// Returned by [`DeployExecutor::try_execute`] when a deploy is running and
/// another is already waiting for the same working copy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("a deploy is already queued for {}", .0.display())]
pub struct DeployQueueFull(pub PathBuf);

/// Per-repository exclusion: one deploy running, at most one waiting
#[derive(Default)]
struct RepoSlot {
    lock: Arc<Mutex<()>>,
    waiting: AtomicBool,
}

/// Clears the waiting flag however the wait ends
struct WaitingTurn<'a>(&'a AtomicBool);

impl Drop for WaitingTurn<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs the pull then the deploy command for a working copy.
///
/// Only one deploy runs per repository path at a time.
pub struct DeployExecutor {
    puller: Arc<dyn SourcePuller>,
    runner: ProcessRunner,
    slots: Mutex<HashMap<PathBuf, Arc<RepoSlot>>>,
}

impl DeployExecutor {
    pub fn new(puller: Arc<dyn SourcePuller>, runner: ProcessRunner) -> Self {
        Self {
            puller,
            runner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Executor backed by `git pull`
    pub fn with_git(pull_timeout: Duration, run_timeout: Duration) -> Self {
        Self::new(
            Arc::new(GitPuller::new(pull_timeout)),
            ProcessRunner::new(run_timeout),
        )
    }

    /// Pull `repo_path`, then run `run_script` in it, waiting for any deploy
    /// already running there.
    ///
    /// A failed pull is recorded and the run still happens. Nothing here
    /// fails: every problem ends up in the returned outcome.
    pub async fn execute(&self, repo_path: &Path, run_script: &str) -> DeployOutcome {
        let slot = self.repo_slot(repo_path).await;
        let _guard = slot.lock.clone().lock_owned().await;
        self.pull_and_run(repo_path, run_script).await
    }

    /// Like [`execute`](Self::execute), but at most one caller waits behind
    /// a running deploy. Anyone arriving after that is turned away.
    pub async fn try_execute(
        &self,
        repo_path: &Path,
        run_script: &str,
    ) -> Result<DeployOutcome, DeployQueueFull> {
        let slot = self.repo_slot(repo_path).await;
        let _guard = self.take_turn(&slot, repo_path).await?;
        Ok(self.pull_and_run(repo_path, run_script).await)
    }

    async fn take_turn(
        &self,
        slot: &RepoSlot,
        repo_path: &Path,
    ) -> Result<OwnedMutexGuard<()>, DeployQueueFull> {
        if let Ok(guard) = slot.lock.clone().try_lock_owned() {
            return Ok(guard);
        }
        if slot.waiting.swap(true, Ordering::SeqCst) {
            warn!(
                "Deploy already queued in {}, rejecting trigger",
                repo_path.display()
            );
            return Err(DeployQueueFull(repo_path.to_path_buf()));
        }
        let _turn = WaitingTurn(&slot.waiting);
        info!(
            "Deploy already running in {}, waiting for it to finish",
            repo_path.display()
        );
        Ok(slot.lock.clone().lock_owned().await)
    }

    async fn pull_and_run(&self, repo_path: &Path, run_script: &str) -> DeployOutcome {
        let mut outcome = DeployOutcome::default();

        // 1. Pull (best effort)
        match self.puller.pull(repo_path).await {
            Ok(output) => {
                outcome.pull_succeeded = true;
                outcome.pull_stdout = output.stdout;
                outcome.pull_stderr = output.stderr;
            }
            Err(e) => {
                warn!("Pull failed, running deploy command anyway: {}", e);
                outcome.push_error(&e.message);
                outcome.pull_stdout = e.stdout;
                outcome.pull_stderr = e.stderr;
            }
        }

        // 2. Tokenize
        let command = match CommandLine::parse(run_script) {
            Ok(command) => command,
            Err(e) => {
                error!("Invalid run script {:?}: {}", run_script, e);
                outcome.push_error(&e.to_string());
                return outcome;
            }
        };

        // 3. Run
        info!(
            "Running deploy command: {} (timeout {:?})",
            command,
            self.runner.timeout()
        );
        let run = self
            .runner
            .run(&command.program, &command.args, repo_path)
            .await;

        // 4. Collect
        if let Some(message) = run.error_message() {
            outcome.push_error(&message);
        }
        outcome.run_exit_code = run.exit_code();
        outcome.run_stdout = run.stdout;
        outcome.run_stderr = run.stderr;

        // 5. Verdict
        outcome.success = outcome.run_exit_code == Some(0);

        if outcome.success {
            info!("Deploy succeeded in {}", repo_path.display());
        } else {
            warn!(
                "Deploy failed in {} (exit code: {:?})",
                repo_path.display(),
                outcome.run_exit_code
            );
        }
        outcome
    }

    async fn repo_slot(&self, repo_path: &Path) -> Arc<RepoSlot> {
        self.slots
            .lock()
            .await
            .entry(repo_path.to_path_buf())
            .or_default()
            .clone()
    }
}
