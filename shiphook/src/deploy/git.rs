//! Source-control pull

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::deploy::process::{ProcessRunner, ProcessStatus};

/// Output of a successful pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A failed pull, with whatever the tool printed before failing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PullError {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

/// Synchronizes a working copy with its remote
#[async_trait]
pub trait SourcePuller: Send + Sync {
    async fn pull(&self, repo_path: &Path) -> Result<PullOutput, PullError>;
}

/// Runs `git pull` in the working copy
#[derive(Debug, Clone)]
pub struct GitPuller {
    runner: ProcessRunner,
}

impl GitPuller {
    pub fn new(timeout: Duration) -> Self {
        Self {
            // Fail instead of waiting on a credential prompt nobody will answer.
            runner: ProcessRunner::new(timeout).with_env("GIT_TERMINAL_PROMPT", "0"),
        }
    }
}

#[async_trait]
impl SourcePuller for GitPuller {
    async fn pull(&self, repo_path: &Path) -> Result<PullOutput, PullError> {
        debug!("Pulling updates in {}", repo_path.display());
        let outcome = self
            .runner
            .run("git", &["pull".to_string()], repo_path)
            .await;

        let message = match &outcome.status {
            ProcessStatus::Exited { code: Some(0) } => {
                info!("git pull completed in {}", repo_path.display());
                return Ok(PullOutput {
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                });
            }
            ProcessStatus::Exited { code: Some(code) } => {
                let detail = outcome.stderr.trim();
                if detail.is_empty() {
                    format!("git pull failed with exit code {}", code)
                } else {
                    format!("git pull failed with exit code {}: {}", code, detail)
                }
            }
            _ => format!(
                "git pull failed: {}",
                outcome.error_message().unwrap_or_default()
            ),
        };

        warn!("{}", message);
        Err(PullError {
            message,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }
}
