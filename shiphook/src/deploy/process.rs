//! Subprocess runner
//!
//! Spawns one program directly (no shell), captures stdout and stderr until
//! both streams close, and kills the process if it outlives its deadline.
//! On unix each program leads its own process group, and the deadline kills
//! the whole group so nothing it forked outlives the run.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default deadline for a single process
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a process run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exited on its own. `code` is `None` when it was ended by
    /// a signal.
    Exited { code: Option<i32> },

    /// The deadline fired first; the process was killed.
    TimedOut { after: Duration },

    /// The process could not be started (or waited on).
    SpawnFailed { message: String },
}

/// Captured result of one process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: ProcessStatus,
}

impl ProcessOutcome {
    fn spawn_failed(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            status: ProcessStatus::SpawnFailed { message },
        }
    }

    /// Exit code, absent on spawn failure, timeout or signal death
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited { code } => code,
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.status, ProcessStatus::TimedOut { .. })
    }

    pub fn spawn_error(&self) -> Option<&str> {
        match &self.status {
            ProcessStatus::SpawnFailed { message } => Some(message),
            _ => None,
        }
    }

    /// Message for runs that produced no exit code. A non-zero exit is not
    /// an error here; callers read the code.
    pub fn error_message(&self) -> Option<String> {
        match &self.status {
            ProcessStatus::Exited { code: Some(_) } => None,
            ProcessStatus::Exited { code: None } => {
                Some("process was terminated by a signal".to_string())
            }
            ProcessStatus::TimedOut { after } => {
                Some(format!("process timed out after {:?} and was killed", after))
            }
            ProcessStatus::SpawnFailed { message } => Some(message.clone()),
        }
    }
}

/// Runs external programs with a deadline
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    envs: Vec<(String, String)>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            envs: Vec::new(),
        }
    }

    /// Add an environment variable for every process this runner starts
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` with `args` in `cwd` and wait for it, up to the timeout.
    ///
    /// Never fails: spawn errors and timeouts are reported in the outcome.
    pub async fn run(&self, program: &str, args: &[String], cwd: &Path) -> ProcessOutcome {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program, cwd = %cwd.display(), error = %e, "failed to spawn process");
                return ProcessOutcome::spawn_failed(format!("failed to spawn {}: {}", program, e));
            }
        };
        debug!(program, pid = ?child.id(), timeout = ?self.timeout, "process spawned");
        let mut group = ProcessGroup::new(child.id());

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // Exit alone is not enough: both streams must reach EOF before the
        // outcome is final.
        let completion = tokio::time::timeout(self.timeout, async {
            let (status, _, _) = tokio::join!(
                child.wait(),
                drain(stdout_pipe.as_mut(), &mut stdout, "stdout"),
                drain(stderr_pipe.as_mut(), &mut stderr, "stderr"),
            );
            status
        })
        .await;

        let status = match completion {
            Ok(Ok(exit)) => {
                // Background jobs the program started on purpose keep running.
                group.release();
                info!(program, exit_code = ?exit.code(), "process exited");
                ProcessStatus::Exited { code: exit.code() }
            }
            Ok(Err(e)) => {
                warn!(program, error = %e, "failed to wait for process");
                group.kill();
                ProcessStatus::SpawnFailed {
                    message: format!("failed to wait for {}: {}", program, e),
                }
            }
            Err(_) => {
                warn!(program, timeout = ?self.timeout, "process timed out, killing");
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(program, error = %e, "failed to kill timed out process");
                }
                ProcessStatus::TimedOut {
                    after: self.timeout,
                }
            }
        };

        ProcessOutcome {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
        }
    }
}

/// Process group led by a spawned child. Killed on drop unless released,
/// so a cancelled run does not leave the group behind.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn release(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "process group killed"),
        // Every member already exited.
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>, name: &str) {
    if let Some(pipe) = pipe {
        if let Err(e) = pipe.read_to_end(buf).await {
            warn!(stream = name, error = %e, "failed to read process output");
        }
    }
}
