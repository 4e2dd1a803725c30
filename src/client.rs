use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("controller error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("controller is not healthy: {0}")]
    Unhealthy(String),

    #[error("timeout waiting for controller to become ready")]
    ReadyTimeout,
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP client for the controller API, used by helper mode.
pub struct ControllerClient {
    base_url: String,
    http: Client,
}

impl ControllerClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Submits a start job and returns its id.
    pub async fn start_containers(
        &self,
        timeout: u64,
        ignore: &[String],
    ) -> Result<String, ClientError> {
        self.submit("start", timeout, ignore).await
    }

    /// Submits a stop job and returns its id.
    pub async fn stop_containers(
        &self,
        timeout: u64,
        ignore: &[String],
    ) -> Result<String, ClientError> {
        self.submit("stop", timeout, ignore).await
    }

    async fn submit(
        &self,
        operation: &str,
        timeout: u64,
        ignore: &[String],
    ) -> Result<String, ClientError> {
        let url = format!("{}/{}", self.base_url, operation);

        let mut request = self.http.post(&url).query(&[("timeout", timeout)]);
        for name in ignore {
            request = request.query(&[("ignore", name)]);
        }

        let response = Self::check(request.send().await?).await?;
        let created: JobCreated = response.json().await?;

        info!(job_id = %created.job_id, operation, "Job submitted");
        Ok(created.job_id)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<String, ClientError> {
        let url = format!("{}/job_status/{}", self.base_url, job_id);
        let response = Self::check(self.http.get(&url).send().await?).await?;
        let status: JobStatusResponse = response.json().await?;
        Ok(status.status)
    }

    /// Polls the job until it reaches a terminal state and returns that
    /// state.
    pub async fn wait_for_job(
        &self,
        job_id: &str,
        poll_interval: Duration,
    ) -> Result<String, ClientError> {
        loop {
            tokio::time::sleep(poll_interval).await;

            let status = self.job_status(job_id).await?;
            debug!(job_id, status = %status, "Job status");

            if status == "completed" || status == "failed" {
                return Ok(status);
            }
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        let url = format!("{}/ping", self.base_url);
        let response = Self::check(self.http.get(&url).send().await?).await?;
        let health: HealthResponse = response.json().await?;

        if health.status != "healthy" {
            return Err(ClientError::Unhealthy(health.status));
        }
        Ok(())
    }

    /// Polls `/ping` until the controller answers healthy or the timeout
    /// expires.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ClientError> {
        info!(
            url = %self.base_url,
            timeout_secs = timeout.as_secs(),
            "Waiting for controller to become ready"
        );

        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::time::sleep(READY_POLL_INTERVAL).await;

            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::ReadyTimeout);
            }

            match self.ping().await {
                Ok(()) => {
                    info!("Controller is ready");
                    return Ok(());
                }
                Err(err) => debug!(error = %err, "Controller not ready yet"),
            }
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status, body })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use crate::api::{create_router, ApiState};
    use crate::docker::testing::{MockContainer, MockDocker};
    use crate::jobs::JobManager;
    use crate::orchestrator::Orchestrator;

    use super::*;

    /// Serves the real router on an ephemeral port and returns a client
    /// pointed at it.
    async fn serve(docker: MockDocker) -> ControllerClient {
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(docker)));
        let state = ApiState::new(Arc::new(JobManager::new(orchestrator, 1)));
        let router = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        ControllerClient::new(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn ping_succeeds_against_a_live_controller() {
        let client = serve(MockDocker::new(vec![])).await;
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn wait_until_ready_returns_once_healthy() {
        let client = serve(MockDocker::new(vec![])).await;
        client
            .wait_until_ready(Duration::from_secs(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_job_polls_to_completion() {
        let client = serve(MockDocker::new(vec![
            MockContainer::managed("a", &[]),
            MockContainer::managed("b", &["a"]),
        ]))
        .await;

        let job_id = client.start_containers(60, &[]).await.unwrap();
        let status = client
            .wait_for_job(&job_id, Duration::from_millis(20))
            .await
            .unwrap();

        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn unknown_job_reports_an_api_error() {
        let client = serve(MockDocker::new(vec![])).await;

        let err = client.job_status("no-such-job").await.unwrap_err();
        match err {
            ClientError::Api { status, .. } => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected api error, got {other}"),
        }
    }
}
