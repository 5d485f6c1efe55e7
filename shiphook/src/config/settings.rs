//! Resolved Shiphook settings

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::process::DEFAULT_TIMEOUT;
use crate::logs::LogLevel;

pub const DEFAULT_PORT: u16 = 3141;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_RUN_SCRIPT: &str = "npm run deploy";
pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_RUN_TIMEOUT: Duration = DEFAULT_TIMEOUT;
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(60);

/// Fully resolved configuration for one listener instance.
///
/// Immutable once built; see [`crate::config::loader`] for how each field is
/// picked from the environment, the settings file, and the defaults.
#[derive(Debug)]
pub struct Settings {
    /// Port for the webhook server
    pub port: u16,

    /// Interface to bind
    pub host: String,

    /// Working copy to pull and run in
    pub repo_path: PathBuf,

    /// Command line to run after the pull
    pub run_script: String,

    /// Shared secret; when set, triggers must present it
    pub secret: Option<SecretString>,

    /// HTTP path of the trigger endpoint
    pub path: String,

    /// Deadline for the deploy command
    pub run_timeout: Duration,

    /// Deadline for `git pull`
    pub pull_timeout: Duration,

    /// Log level
    pub log_level: LogLevel,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Directory for rolling log files
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Settings with every field at its default, rooted at `repo_path`
    pub fn with_defaults(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            repo_path: repo_path.into(),
            run_script: DEFAULT_RUN_SCRIPT.to_string(),
            secret: None,
            path: DEFAULT_PATH.to_string(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
        }
    }
}
