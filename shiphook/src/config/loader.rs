//! Layered configuration loading
//!
//! Each field is resolved on its own: the environment wins over the settings
//! file, which wins over the built-in default. A value that fails validation
//! is dropped with a warning and the next source is consulted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value};

use crate::config::settings::Settings;
use crate::errors::ShiphookError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Settings file looked up in the current directory when none is requested
pub const DEFAULT_SETTINGS_FILE: &str = "shiphook.json";

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "SHIPHOOK_CONFIG";

/// Result of loading settings
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: Settings,

    /// Settings file that contributed, if any
    pub source: Option<PathBuf>,

    /// Values that were discarded during resolution
    pub warnings: Vec<String>,
}

/// Load settings from the process environment and an optional settings file.
///
/// `config_path` (or `SHIPHOOK_CONFIG`) names a file that must exist. Without
/// one, `shiphook.json` in the current directory is used when present.
pub async fn load_settings(config_path: Option<&Path>) -> Result<LoadedSettings, ShiphookError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let cwd = std::env::current_dir()?;

    let explicit = config_path
        .map(Path::to_path_buf)
        .or_else(|| env.get(CONFIG_ENV).filter(|p| !p.is_empty()).map(PathBuf::from));

    let file = match explicit {
        Some(path) => {
            let file = File::new(cwd.join(path));
            if !file.exists().await {
                return Err(ShiphookError::ConfigError(format!(
                    "settings file not found: {}",
                    file.path().display()
                )));
            }
            Some(file)
        }
        None => {
            let file = File::new(cwd.join(DEFAULT_SETTINGS_FILE));
            file.exists().await.then_some(file)
        }
    };

    let contents = match &file {
        Some(file) => {
            let value: Value = file.read_json().await?;
            if !value.is_object() {
                return Err(ShiphookError::ConfigError(format!(
                    "settings file {} must contain a JSON object",
                    file.path().display()
                )));
            }
            Some(value)
        }
        None => None,
    };

    let (settings, warnings) = resolve(&env, contents.as_ref(), &cwd);
    Ok(LoadedSettings {
        settings,
        source: file.map(|f| f.path().to_path_buf()),
        warnings,
    })
}

/// Resolve settings from an environment map and optional settings file
/// contents. Pure: no I/O, no process state.
pub fn resolve(
    env: &HashMap<String, String>,
    file: Option<&Value>,
    cwd: &Path,
) -> (Settings, Vec<String>) {
    let mut sources = Sources {
        env,
        file: file.and_then(Value::as_object),
        warnings: Vec::new(),
    };
    let mut settings = Settings::with_defaults(cwd);

    if let Some(port) = sources.pick("SHIPHOOK_PORT", "port", parse_port) {
        settings.port = port;
    }
    if let Some(host) = sources.pick("SHIPHOOK_HOST", "host", parse_non_empty) {
        settings.host = host;
    }
    if let Some(repo_path) = sources.pick("SHIPHOOK_REPO_PATH", "repoPath", parse_non_empty) {
        settings.repo_path = cwd.join(repo_path);
    }
    if let Some(run_script) = sources.pick("SHIPHOOK_RUN_SCRIPT", "runScript", parse_non_empty) {
        settings.run_script = run_script;
    }
    settings.secret = sources
        .pick("SHIPHOOK_SECRET", "secret", parse_secret)
        .map(SecretString::from);
    if let Some(path) = sources.pick("SHIPHOOK_PATH", "path", parse_http_path) {
        settings.path = path;
    }
    if let Some(timeout) = sources.pick("SHIPHOOK_TIMEOUT_SECS", "timeoutSecs", parse_seconds) {
        settings.run_timeout = timeout;
    }
    if let Some(timeout) =
        sources.pick("SHIPHOOK_PULL_TIMEOUT_SECS", "pullTimeoutSecs", parse_seconds)
    {
        settings.pull_timeout = timeout;
    }
    if let Some(level) = sources.pick("SHIPHOOK_LOG_LEVEL", "logLevel", parse_log_level) {
        settings.log_level = level;
    }
    if let Some(json) = sources.pick("SHIPHOOK_LOG_JSON", "logJson", parse_bool) {
        settings.log_json = json;
    }
    settings.log_dir = sources
        .pick("SHIPHOOK_LOG_DIR", "logDir", parse_non_empty)
        .map(|dir| cwd.join(dir));

    (settings, sources.warnings)
}

/// A single raw configuration value, from either source
enum Raw<'a> {
    Env(&'a str),
    File(&'a Value),
}

impl Raw<'_> {
    fn as_str(&self) -> Option<&str> {
        match self {
            Raw::Env(s) => Some(*s),
            Raw::File(v) => v.as_str(),
        }
    }
}

struct Sources<'a> {
    env: &'a HashMap<String, String>,
    file: Option<&'a Map<String, Value>>,
    warnings: Vec<String>,
}

impl Sources<'_> {
    /// Take the first valid value, environment first, then the file.
    ///
    /// `Ok(None)` from `parse` means "explicitly unset" and stops the lookup
    /// without a warning; `Err` discards the value and moves on.
    fn pick<T>(
        &mut self,
        env_key: &str,
        file_key: &str,
        parse: impl Fn(&Raw<'_>) -> Result<Option<T>, String>,
    ) -> Option<T> {
        if let Some(value) = self.env.get(env_key) {
            match parse(&Raw::Env(value)) {
                Ok(parsed) => return parsed,
                Err(reason) => self
                    .warnings
                    .push(format!("ignoring {env_key}={value:?}: {reason}")),
            }
        }

        if let Some(value) = self.file.and_then(|file| file.get(file_key)) {
            if value.is_null() {
                return None;
            }
            match parse(&Raw::File(value)) {
                Ok(parsed) => return parsed,
                Err(reason) => self
                    .warnings
                    .push(format!("ignoring settings file key {file_key:?}: {reason}")),
            }
        }

        None
    }
}

fn parse_port(raw: &Raw<'_>) -> Result<Option<u16>, String> {
    let port = match raw {
        Raw::File(v) if v.is_number() => v.as_u64(),
        _ => raw.as_str().and_then(|s| s.trim().parse::<u64>().ok()),
    };
    port.and_then(|p| u16::try_from(p).ok())
        .map(Some)
        .ok_or_else(|| "expected a port number between 0 and 65535".to_string())
}

fn parse_seconds(raw: &Raw<'_>) -> Result<Option<Duration>, String> {
    let secs = match raw {
        Raw::File(v) if v.is_number() => v.as_u64(),
        _ => raw.as_str().and_then(|s| s.trim().parse::<u64>().ok()),
    };
    match secs {
        Some(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err("expected a positive number of seconds".to_string()),
    }
}

fn parse_non_empty(raw: &Raw<'_>) -> Result<Option<String>, String> {
    match raw.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(_) => Err("value is empty".to_string()),
        None => Err("expected a string".to_string()),
    }
}

fn parse_secret(raw: &Raw<'_>) -> Result<Option<String>, String> {
    match raw.as_str() {
        Some("") => Ok(None),
        Some(s) => Ok(Some(s.to_string())),
        None => Err("expected a string".to_string()),
    }
}

fn parse_http_path(raw: &Raw<'_>) -> Result<Option<String>, String> {
    match raw.as_str().map(str::trim) {
        Some(s) if s.starts_with('/') => Ok(Some(s.to_string())),
        Some(_) => Err("path must start with '/'".to_string()),
        None => Err("expected a string".to_string()),
    }
}

fn parse_log_level(raw: &Raw<'_>) -> Result<Option<LogLevel>, String> {
    raw.as_str()
        .ok_or_else(|| "expected a string".to_string())?
        .parse::<LogLevel>()
        .map(Some)
}

fn parse_bool(raw: &Raw<'_>) -> Result<Option<bool>, String> {
    if let Raw::File(Value::Bool(b)) = raw {
        return Ok(Some(*b));
    }
    match raw.as_str().map(|s| s.trim().to_lowercase()).as_deref() {
        Some("true" | "1" | "yes") => Ok(Some(true)),
        Some("false" | "0" | "no") => Ok(Some(false)),
        _ => Err("expected true or false".to_string()),
    }
}
