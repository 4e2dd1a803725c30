use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::client::ControllerClient;
use crate::config::HelperConfig;

const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Helper mode: start containers once the controller is up, then wait for a
/// shutdown signal and stop them again. Designed to run as a systemd unit
/// tied to docker.service.
pub async fn run(config: HelperConfig) -> Result<()> {
    info!(
        controller_url = %config.controller_url,
        startup_delay = ?config.startup_delay,
        timeout = config.timeout,
        "Starting controller helper"
    );

    let client = ControllerClient::new(&config.controller_url)?;

    client
        .wait_until_ready(READY_TIMEOUT)
        .await
        .context("controller not ready")?;

    info!(delay = ?config.startup_delay, "Waiting for startup delay");
    tokio::time::sleep(config.startup_delay).await;

    info!("Submitting container start job");
    let job_id = client
        .start_containers(config.timeout, &[])
        .await
        .context("failed to submit start job")?;

    info!(job_id = %job_id, "Start job submitted, waiting for completion");
    let status = client.wait_for_job(&job_id, config.poll_interval).await?;
    if status == "failed" {
        error!(job_id = %job_id, "Start job failed");
    } else {
        info!(job_id = %job_id, "Containers started successfully");
    }

    info!("Helper running, waiting for shutdown signal...");
    crate::shutdown_signal().await?;

    info!("Shutdown signal received, stopping containers");
    let job_id = client
        .stop_containers(config.timeout, &[])
        .await
        .context("failed to submit stop job")?;

    info!(job_id = %job_id, "Stop job submitted, waiting for completion");
    let status = client.wait_for_job(&job_id, config.poll_interval).await?;
    if status == "failed" {
        error!(job_id = %job_id, "Stop job failed");
    } else {
        info!(job_id = %job_id, "Containers stopped successfully");
    }

    info!("Helper shutdown complete");
    Ok(())
}
