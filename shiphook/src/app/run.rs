//! Main application run loop

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::executor::DeployExecutor;
use crate::errors::ShiphookError;
use crate::server::auth::AuthGuard;
use crate::server::route::RouteMatcher;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// A started listener
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<Result<(), ShiphookError>>,
}

/// Bind the listener and start serving in the background
pub async fn start(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<RunningServer, ShiphookError> {
    let AppOptions {
        server,
        webhook,
        deploy,
    } = options;

    let executor = Arc::new(DeployExecutor::with_git(
        deploy.pull_timeout,
        deploy.run_timeout,
    ));
    let auth = AuthGuard::new(webhook.secret);
    let auth_enabled = auth.is_enabled();
    let state = Arc::new(ServerState::new(
        RouteMatcher::new(&webhook.path),
        auth,
        executor,
        webhook.repo_path.clone(),
        webhook.run_script.clone(),
    ));

    let (local_addr, serving) = serve(&server, state.clone(), shutdown_signal).await?;
    let path = match state.route.path() {
        "/" => String::new(),
        path => path.to_string(),
    };

    // Deploys outlive the connections that started them; the server is only
    // done once those finish too.
    let handle = tokio::spawn(async move {
        let result = match serving.await {
            Ok(result) => result,
            Err(e) => Err(ShiphookError::ServerError(e.to_string())),
        };
        state.finish_deploys().await;
        result
    });

    info!("Shiphook listening on http://localhost:{}{}", local_addr.port(), path);
    info!("  Repo: {}", webhook.repo_path.display());
    info!("  Run:  {}", webhook.run_script);
    if auth_enabled {
        info!("  Auth: secret set");
    }

    Ok(RunningServer { local_addr, handle })
}

/// Run Shiphook until the shutdown signal resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ShiphookError> {
    let server = start(options, shutdown_signal).await?;
    let result = server
        .handle
        .await
        .map_err(|e| ShiphookError::ServerError(e.to_string()))?;
    info!("Shiphook stopped");
    result
}
