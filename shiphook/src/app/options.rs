//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::settings::{self, Settings};
use crate::logs::LogOptions;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Trigger endpoint and what it deploys
    pub webhook: WebhookOptions,

    /// Subprocess deadlines
    pub deploy: DeployOptions,
}

impl AppOptions {
    /// Split settings into app options and logging options
    pub fn from_settings(settings: Settings) -> (Self, LogOptions) {
        let log_options = LogOptions {
            log_level: settings.log_level,
            log_dir: settings.log_dir,
            json_format: settings.log_json,
            ..Default::default()
        };

        let options = Self {
            server: ServerOptions {
                host: settings.host,
                port: settings.port,
            },
            webhook: WebhookOptions {
                path: settings.path,
                repo_path: settings.repo_path,
                run_script: settings.run_script,
                secret: settings.secret,
            },
            deploy: DeployOptions {
                run_timeout: settings.run_timeout,
                pull_timeout: settings.pull_timeout,
            },
        };

        (options, log_options)
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on; 0 picks a free port
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: settings::DEFAULT_HOST.to_string(),
            port: settings::DEFAULT_PORT,
        }
    }
}

/// Trigger endpoint options
#[derive(Debug)]
pub struct WebhookOptions {
    /// HTTP path of the trigger
    pub path: String,

    /// Working copy to deploy
    pub repo_path: PathBuf,

    /// Command line run after the pull
    pub run_script: String,

    /// Shared secret, if triggers must authenticate
    pub secret: Option<SecretString>,
}

/// Subprocess deadlines
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub run_timeout: Duration,
    pub pull_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            run_timeout: settings::DEFAULT_RUN_TIMEOUT,
            pull_timeout: settings::DEFAULT_PULL_TIMEOUT,
        }
    }
}
