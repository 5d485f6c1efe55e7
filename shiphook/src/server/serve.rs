//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ShiphookError;
use crate::server::handlers::trigger_handler;
use crate::server::state::ServerState;

/// Build the router. The trigger handler does its own method and path
/// matching, so it sits in the fallback slot and sees every request.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .fallback(trigger_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<Result<(), ShiphookError>>), ShiphookError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ShiphookError::ServerError(format!("failed to bind {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ShiphookError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ShiphookError::ServerError(e.to_string()))
    });

    Ok((local_addr, handle))
}
