use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{ContainerInspectResponse, HealthStatusEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::{debug, info};

use super::{ContainerApi, ContainerDetails, DockerError, HealthStatus, ManagedContainer};

const MANAGED_FILTER: &str = "com.github.saltbox.saltbox_managed=true";

/// Wraps the bollard client with the container operations the orchestrator
/// needs.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connects to the Docker daemon, using the default socket unless an
    /// explicit host is given, and verifies the connection.
    pub async fn connect(host: Option<&str>) -> Result<Self, DockerError> {
        let docker = match host {
            Some(host) => Docker::connect_with_socket(host, 120, API_DEFAULT_VERSION)?,
            None => Docker::connect_with_socket_defaults()?,
        };

        let version = docker.version().await?;
        info!(
            version = %version.version.unwrap_or_default(),
            "Connected to Docker daemon"
        );

        Ok(Self { docker })
    }

    async fn inspect_raw(
        &self,
        name_or_id: &str,
    ) -> Result<ContainerInspectResponse, DockerError> {
        Ok(self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await?)
    }
}

#[async_trait]
impl ContainerApi for DockerClient {
    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, DockerError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![MANAGED_FILTER.to_string()]);

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(summaries
            .into_iter()
            .filter_map(ManagedContainer::from_summary)
            .collect())
    }

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerDetails, DockerError> {
        let info = self.inspect_raw(name_or_id).await?;
        let config = info.config.as_ref();

        Ok(ContainerDetails {
            stop_timeout: config.and_then(|c| c.stop_timeout),
            has_health_check: config.and_then(|c| c.healthcheck.as_ref()).is_some(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        debug!(container = %id, "Container started");
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), DockerError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await?;

        debug!(container = %id, "Container stopped");
        Ok(())
    }

    async fn is_running(&self, name_or_id: &str) -> Result<bool, DockerError> {
        let info = self.inspect_raw(name_or_id).await?;
        Ok(info
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn has_health_check(&self, name_or_id: &str) -> Result<bool, DockerError> {
        let info = self.inspect_raw(name_or_id).await?;
        Ok(info
            .config
            .as_ref()
            .and_then(|config| config.healthcheck.as_ref())
            .is_some())
    }

    async fn health_status(&self, name_or_id: &str) -> Result<HealthStatus, DockerError> {
        let info = self.inspect_raw(name_or_id).await?;
        let status = info
            .state
            .as_ref()
            .and_then(|state| state.health.as_ref())
            .and_then(|health| health.status);

        Ok(match status {
            Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
            Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
            Some(HealthStatusEnum::STARTING) => HealthStatus::Starting,
            _ => HealthStatus::None,
        })
    }
}
