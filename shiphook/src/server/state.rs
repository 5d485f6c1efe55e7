//! Server state

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::info;

use crate::deploy::executor::DeployExecutor;
use crate::server::auth::AuthGuard;
use crate::server::route::RouteMatcher;

/// Server state shared across handlers. Immutable apart from the executor's
/// per-repository locks and the set of deploys in flight.
pub struct ServerState {
    pub route: RouteMatcher,
    pub auth: AuthGuard,
    pub executor: Arc<DeployExecutor>,
    pub repo_path: PathBuf,
    pub run_script: String,

    /// Deploy tasks, tracked apart from their requests so shutdown can wait
    /// for them
    pub deploys: TaskTracker,
}

impl ServerState {
    pub fn new(
        route: RouteMatcher,
        auth: AuthGuard,
        executor: Arc<DeployExecutor>,
        repo_path: PathBuf,
        run_script: String,
    ) -> Self {
        Self {
            route,
            auth,
            executor,
            repo_path,
            run_script,
            deploys: TaskTracker::new(),
        }
    }

    /// Stop accepting deploy tasks and wait for the running ones
    pub async fn finish_deploys(&self) {
        self.deploys.close();
        if !self.deploys.is_empty() {
            info!("Waiting for {} deploy(s) to finish", self.deploys.len());
        }
        self.deploys.wait().await;
    }
}
