mod client;
mod labels;

pub use client::DockerClient;
pub use labels::ContainerLabels;

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::models::ContainerSummary;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("docker api error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("container not found: {0}")]
    #[allow(dead_code)]
    NotFound(String),
}

/// One row from the daemon's container listing, reduced to the fields the
/// orchestrator cares about. The name has its leading slash stripped.
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub state: String,
}

impl ManagedContainer {
    /// Converts a daemon listing row. Rows without an id or name are dropped.
    pub fn from_summary(summary: ContainerSummary) -> Option<Self> {
        let id = summary.id?;
        let name = summary
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|name| name.strip_prefix('/').unwrap_or(name).to_string())?;

        Some(Self {
            id,
            name,
            labels: summary.labels.unwrap_or_default(),
            state: summary.state.unwrap_or_default(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Container configuration details relevant to orchestration.
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub stop_timeout: Option<i64>,
    pub has_health_check: bool,
}

/// Health state as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    None,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Starting => "starting",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The daemon operations the graph builder and executor consume. Implemented
/// by [`DockerClient`]; tests substitute a recording mock.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Lists all containers carrying the managed label, running or not.
    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, DockerError>;

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerDetails, DockerError>;

    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), DockerError>;

    async fn is_running(&self, name_or_id: &str) -> Result<bool, DockerError>;

    async fn has_health_check(&self, name_or_id: &str) -> Result<bool, DockerError>;

    async fn health_status(&self, name_or_id: &str) -> Result<HealthStatus, DockerError>;
}
