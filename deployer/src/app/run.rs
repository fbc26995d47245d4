//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::DeployError;
use crate::models::deploy::{DeployOutcome, DeployRequest};
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// User recorded on deploys started from the command line
pub const CLI_USER: &str = "cli";

/// Serve the HTTP API until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing IIS deployer...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);

    let app_state = AppState::init(&options.settings).await?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server_state = ServerState::new(app_state.orchestrator.clone());
    let server_handle = serve(&options.settings.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    let _ = shutdown_tx.send(());
    shutdown(server_handle, options.lifecycle.max_shutdown_delay).await
}

/// Run a single deploy and return its outcome
pub async fn run_once(
    options: AppOptions,
    request: DeployRequest,
) -> Result<DeployOutcome, DeployError> {
    let app_state = AppState::init(&options.settings).await?;
    app_state.orchestrator.deploy(request, CLI_USER).await
}

async fn shutdown(
    server_handle: JoinHandle<Result<(), DeployError>>,
    max_delay: Duration,
) -> Result<(), DeployError> {
    match tokio::time::timeout(max_delay, server_handle).await {
        Ok(joined) => {
            joined.map_err(|e| DeployError::ServerError(e.to_string()))??;
            info!("Shutdown complete");
            Ok(())
        }
        Err(_) => {
            error!("Shutdown timed out after {:?}", max_delay);
            Err(DeployError::Timeout(format!(
                "server did not stop within {:?}",
                max_delay
            )))
        }
    }
}
