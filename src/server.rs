use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{create_router, ApiState};
use crate::config::ServerConfig;
use crate::docker::DockerClient;
use crate::jobs::JobManager;
use crate::orchestrator::Orchestrator;

const WORKER_COUNT: usize = 3;
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const MANAGER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the controller API server until SIGINT/SIGTERM, then drains HTTP
/// and shuts the job manager down.
pub async fn run(config: ServerConfig) -> Result<()> {
    info!(
        host = %config.host,
        port = config.port,
        "Starting Saltbox Docker Controller"
    );

    let docker = Arc::new(
        DockerClient::connect(None)
            .await
            .context("failed to create Docker client")?,
    );
    info!("Docker client initialized");

    let orchestrator = Arc::new(Orchestrator::new(docker));
    info!("Orchestrator initialized");

    let job_manager = Arc::new(JobManager::new(orchestrator, WORKER_COUNT));

    let state = ApiState::new(job_manager.clone());
    let app = create_router(state);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(addr = %bind_addr, "API server listening");

    let shutdown = CancellationToken::new();
    let mut server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        })
    };

    crate::shutdown_signal().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, &mut server).await {
        Ok(joined) => {
            joined?.context("server error")?;
            info!("HTTP server stopped gracefully");
        }
        Err(_) => {
            error!("HTTP server shutdown timed out");
            server.abort();
        }
    }

    job_manager.shutdown(MANAGER_SHUTDOWN_TIMEOUT).await;

    info!("Server shutdown complete");
    Ok(())
}
