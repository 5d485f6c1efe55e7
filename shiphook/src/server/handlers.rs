//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::server::response::{
    internal_error, not_found, queue_full, unauthorized, DeployResponse,
};
use crate::server::state::ServerState;

/// Handles every request on the listener.
///
/// Route mismatch gives 404 and a bad secret 401. A trigger arriving while
/// another already waits behind a running deploy gets 409. Anything else runs
/// a deploy and answers 200 with the outcome, whether or not the deploy worked.
pub async fn trigger_handler(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let raw_path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    if !state.route.matches(&method, raw_path) {
        debug!("No route for {} {}", method, raw_path);
        return not_found();
    }

    if !state.auth.admit(&headers) {
        warn!("Rejected trigger on {}: missing or invalid secret", raw_path);
        return unauthorized();
    }

    let deploy_id = Uuid::new_v4();
    let span = info_span!("deploy", %deploy_id);
    info!(parent: &span, "Trigger accepted, starting deploy");

    // Detached so a client hanging up does not kill the deploy midway;
    // tracked so shutdown waits for it.
    let executor = state.executor.clone();
    let repo_path = state.repo_path.clone();
    let run_script = state.run_script.clone();
    let task = state.deploys.spawn(
        async move { executor.try_execute(&repo_path, &run_script).await }
            .instrument(span.clone()),
    );

    match task.await {
        Ok(Ok(outcome)) => {
            info!(parent: &span, success = outcome.success, "Deploy finished");
            DeployResponse::from(outcome).into_response()
        }
        Ok(Err(e)) => {
            warn!(parent: &span, "Trigger rejected: {}", e);
            queue_full()
        }
        Err(e) => {
            error!(parent: &span, "Deploy task failed: {}", e);
            internal_error()
        }
    }
}
