//! JSON response bodies

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::deploy::executor::DeployOutcome;

/// Body for requests that never reached the deploy pipeline
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))).into_response()
}

pub fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new("Unauthorized"))).into_response()
}

pub fn queue_full() -> Response {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse::new("Deploy already queued")),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal error")),
    )
        .into_response()
}

/// Body for a matched, authorized trigger
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub ok: bool,
    pub pull: PullReport,
    pub run: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PullReport {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl From<DeployOutcome> for DeployResponse {
    fn from(outcome: DeployOutcome) -> Self {
        Self {
            ok: outcome.success,
            pull: PullReport {
                success: outcome.pull_succeeded,
                stdout: outcome.pull_stdout,
                stderr: outcome.pull_stderr,
            },
            run: RunReport {
                stdout: outcome.run_stdout,
                stderr: outcome.run_stderr,
                exit_code: outcome.run_exit_code,
            },
            error: outcome.error,
        }
    }
}

impl IntoResponse for DeployResponse {
    /// Always 200: the deploy verdict lives in `ok`, not in the status.
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
