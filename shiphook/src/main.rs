//! Shiphook - Entry Point
//!
//! Listens for an authenticated webhook, pulls the configured repository and
//! runs its deploy command.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::ExitCode;

use shiphook::app::options::AppOptions;
use shiphook::app::run::run;
use shiphook::config::loader::load_settings;
use shiphook::logs::init_logging;
use shiphook::utils::version_info;

use tracing::{error, info, warn};

const USAGE: &str = "\
Usage: shiphook [--config=<path>] [--version] [--help]

Configuration comes from SHIPHOOK_* environment variables, then the settings
file (shiphook.json in the current directory unless --config is given), then
built-in defaults:

  SHIPHOOK_PORT               port to listen on (3141)
  SHIPHOOK_HOST               interface to bind (0.0.0.0)
  SHIPHOOK_REPO_PATH          repository to pull and deploy (current directory)
  SHIPHOOK_RUN_SCRIPT         deploy command (npm run deploy)
  SHIPHOOK_SECRET             shared secret required from callers (none)
  SHIPHOOK_PATH               trigger path (/)
  SHIPHOOK_TIMEOUT_SECS       deploy command timeout (60)
  SHIPHOOK_PULL_TIMEOUT_SECS  git pull timeout (60)
  SHIPHOOK_LOG_LEVEL          trace, debug, info, warn or error (info)
  SHIPHOOK_LOG_JSON           emit JSON logs (false)
  SHIPHOOK_LOG_DIR            also write daily log files here (unset)";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli_args = match parse_args(&args) {
        Ok(cli_args) => cli_args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if cli_args.contains_key("help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{version}"),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    // Settings decide the log level, so they load before logging exists.
    let config_path = cli_args.get("config").map(Path::new);
    let loaded = match load_settings(config_path).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Unable to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (options, log_options) = AppOptions::from_settings(loaded.settings);
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    if let Some(source) = &loaded.source {
        info!("Loaded settings from {}", source.display());
    }
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    info!("Running Shiphook {}", version_info().version);
    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Shiphook failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Flags that only make sense with `=<value>`
const VALUE_FLAGS: &[&str] = &["config"];

/// Parse `--key=value` options and standalone `--flag`s
fn parse_args(args: &[String]) -> Result<HashMap<String, String>, String> {
    let mut cli_args = HashMap::new();

    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            if value.is_empty() {
                return Err(format!("Missing value for --{clean_key}"));
            }
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            if VALUE_FLAGS.contains(&clean_key) {
                return Err(format!("--{clean_key} needs a value: --{clean_key}=<path>"));
            }
            cli_args.insert(clean_key.to_string(), "true".to_string());
        } else {
            return Err(format!("Unexpected argument: {arg}"));
        }
    }

    Ok(cli_args)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to listen for SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
