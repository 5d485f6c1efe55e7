//! Error types for Shiphook

use thiserror::Error;

/// Main error type for Shiphook
///
/// Deploy failures are not errors: they are captured in
/// [`DeployOutcome`](crate::deploy::executor::DeployOutcome). This enum covers
/// the infrastructure around the pipeline.
#[derive(Error, Debug)]
pub enum ShiphookError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),
}
