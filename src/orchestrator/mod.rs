use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::docker::{ContainerApi, DockerError, HealthStatus};
use crate::graph::{ComponentBatches, Graph, GraphBuilder, GraphError, NodeId};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const HEALTH_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STOP_TIMEOUT: i64 = 10;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to list containers: {0}")]
    List(#[source] DockerError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Operation timeout in seconds.
    pub timeout: u64,
    /// Container names to skip.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub timeout: u64,
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StartResult {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StopResult {
    pub stopped: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
}

#[derive(Debug, Default)]
struct ActionOutcome {
    done: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<String>,
}

impl ActionOutcome {
    fn merge(&mut self, other: ActionOutcome) {
        self.done.extend(other.done);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

enum NodeOutcome {
    Done,
    Skipped,
    Failed,
}

/// Drives container start/stop across the dependency graph: independent
/// components in parallel, batches within a component in series, nodes
/// within a batch in parallel.
pub struct Orchestrator {
    docker: Arc<dyn ContainerApi>,
    builder: GraphBuilder,
}

impl Orchestrator {
    pub fn new(docker: Arc<dyn ContainerApi>) -> Self {
        Self {
            builder: GraphBuilder::new(docker.clone()),
            docker,
        }
    }

    /// Starts all managed containers in dependency order.
    pub async fn start_containers(
        &self,
        opts: StartOptions,
    ) -> Result<StartResult, OrchestratorError> {
        info!(
            timeout = opts.timeout,
            ignore = ?opts.ignore,
            "Starting container orchestration"
        );

        let outcome = self.run(Action::Start, opts.timeout, opts.ignore).await?;

        info!(
            started = outcome.done.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            "Container startup complete"
        );

        Ok(StartResult {
            started: outcome.done,
            skipped: outcome.skipped,
            failed: outcome.failed,
        })
    }

    /// Stops all managed containers in reverse dependency order.
    pub async fn stop_containers(
        &self,
        opts: StopOptions,
    ) -> Result<StopResult, OrchestratorError> {
        info!(
            timeout = opts.timeout,
            ignore = ?opts.ignore,
            "Stopping container orchestration"
        );

        let outcome = self.run(Action::Stop, opts.timeout, opts.ignore).await?;

        info!(
            stopped = outcome.done.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            "Container shutdown complete"
        );

        Ok(StopResult {
            stopped: outcome.done,
            skipped: outcome.skipped,
            failed: outcome.failed,
        })
    }

    async fn run(
        &self,
        action: Action,
        timeout_secs: u64,
        ignore: Vec<String>,
    ) -> Result<ActionOutcome, OrchestratorError> {
        let containers = self
            .docker
            .list_managed()
            .await
            .map_err(OrchestratorError::List)?;

        info!(count = containers.len(), "Found managed containers");

        let graph = Arc::new(self.builder.build(&containers).await);

        // Cycle validation happens here, before any container is touched.
        let components = match action {
            Action::Start => graph.connected_components()?,
            Action::Stop => graph.connected_components_for_shutdown()?,
        };

        info!(
            component_count = components.len(),
            "Identified connected components"
        );

        if components.is_empty() {
            return Ok(ActionOutcome::default());
        }

        let cancel = CancellationToken::new();
        let deadline = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                sleep(Duration::from_secs(timeout_secs)).await;
                cancel.cancel();
            }
        });

        let ignore: Arc<HashSet<String>> = Arc::new(ignore.into_iter().collect());
        let (component_tx, mut component_rx) = mpsc::channel(components.len());

        for (index, component) in components.into_iter().enumerate() {
            let docker = self.docker.clone();
            let graph = graph.clone();
            let ignore = ignore.clone();
            let cancel = cancel.clone();
            let component_tx = component_tx.clone();

            tokio::spawn(async move {
                let outcome =
                    run_component(docker, graph, component, index, action, ignore, cancel).await;
                let _ = component_tx.send(outcome).await;
            });
        }
        drop(component_tx);

        // Channel closure is the completion signal for the component fan-out.
        let mut outcome = ActionOutcome::default();
        while let Some(part) = component_rx.recv().await {
            outcome.merge(part);
        }

        deadline.abort();
        Ok(outcome)
    }
}

async fn run_component(
    docker: Arc<dyn ContainerApi>,
    graph: Arc<Graph>,
    component: ComponentBatches,
    index: usize,
    action: Action,
    ignore: Arc<HashSet<String>>,
    cancel: CancellationToken,
) -> ActionOutcome {
    let names: Vec<String> = component
        .batches
        .iter()
        .flat_map(|batch| graph.names(batch))
        .collect();

    if names.len() > 1 {
        info!(
            containers = ?names,
            batch_count = component.batches.len(),
            "Processing component"
        );
    } else {
        debug!(
            containers = ?names,
            batch_count = component.batches.len(),
            "Processing component"
        );
    }

    let mut outcome = ActionOutcome::default();

    // Batches run in series; each batch is a barrier for the next.
    for (batch_index, batch) in component.batches.iter().enumerate() {
        debug!(
            component = index,
            batch = batch_index,
            containers = batch.len(),
            "Processing batch within component"
        );

        let (batch_tx, mut batch_rx) = mpsc::channel(batch.len());

        for &node_id in batch {
            let docker = docker.clone();
            let graph = graph.clone();
            let ignore = ignore.clone();
            let cancel = cancel.clone();
            let batch_tx = batch_tx.clone();

            tokio::spawn(async move {
                let name = graph.node(node_id).name.clone();

                let result = if ignore.contains(&name) {
                    NodeOutcome::Skipped
                } else {
                    let step = match action {
                        Action::Start => start_one(&*docker, &graph, node_id, &cancel).await,
                        Action::Stop => stop_one(&*docker, &graph, node_id, &cancel).await,
                    };

                    match step {
                        Ok(()) => NodeOutcome::Done,
                        Err(err) => {
                            error!(
                                container = %name,
                                component = index,
                                batch = batch_index,
                                error = %err,
                                "Container action failed"
                            );
                            NodeOutcome::Failed
                        }
                    }
                };

                let _ = batch_tx.send((name, result)).await;
            });
        }
        drop(batch_tx);

        while let Some((name, result)) = batch_rx.recv().await {
            match result {
                NodeOutcome::Done => outcome.done.push(name),
                NodeOutcome::Skipped => outcome.skipped.push(name),
                NodeOutcome::Failed => outcome.failed.push(name),
            }
        }
    }

    outcome
}

/// Races a daemon call against the operation deadline.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, DockerError>>,
) -> Result<T, OrchestratorError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
        result = call => result.map_err(OrchestratorError::from),
    }
}

async fn start_one(
    docker: &dyn ContainerApi,
    graph: &Graph,
    id: NodeId,
    cancel: &CancellationToken,
) -> Result<(), OrchestratorError> {
    let node = graph.node(id);

    if with_cancel(cancel, docker.is_running(&node.name)).await? {
        debug!(container = %node.name, "Container already running, skipping");
        return Ok(());
    }

    info!(
        container = %node.name,
        delay = node.startup_delay,
        wait_healthcheck = node.wait_for_healthcheck,
        "Starting container"
    );

    if node.wait_for_healthcheck && node.has_parents() {
        info!(
            container = %node.name,
            parent_count = node.parents.len(),
            "Waiting for parent dependencies' health checks"
        );

        for &parent_id in &node.parents {
            let parent = graph.node(parent_id);
            if parent.is_placeholder {
                continue;
            }

            match with_cancel(cancel, docker.has_health_check(&parent.name)).await {
                Err(OrchestratorError::Cancelled) => return Err(OrchestratorError::Cancelled),
                Err(err) => {
                    warn!(
                        container = %node.name,
                        parent = %parent.name,
                        error = %err,
                        "Failed to check parent health config"
                    );
                    continue;
                }
                Ok(false) => {
                    debug!(
                        container = %node.name,
                        parent = %parent.name,
                        "Parent has no health check, skipping"
                    );
                    continue;
                }
                Ok(true) => {}
            }

            // Health gating is advisory: a parent that never turns healthy
            // must not wedge the whole startup.
            if let Err(err) = wait_for_healthy(docker, &parent.name, cancel).await {
                match err {
                    OrchestratorError::Cancelled => return Err(err),
                    err => warn!(
                        container = %node.name,
                        parent = %parent.name,
                        error = %err,
                        "Parent health check wait failed, continuing anyway"
                    ),
                }
            }
        }
    }

    if node.startup_delay > 0 {
        debug!(
            container = %node.name,
            delay = node.startup_delay,
            "Applying startup delay"
        );

        tokio::select! {
            _ = sleep(Duration::from_secs(node.startup_delay)) => {}
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
        }
    }

    with_cancel(cancel, docker.start_container(&node.id)).await?;

    info!(container = %node.name, "Container started successfully");
    Ok(())
}

async fn stop_one(
    docker: &dyn ContainerApi,
    graph: &Graph,
    id: NodeId,
    cancel: &CancellationToken,
) -> Result<(), OrchestratorError> {
    let node = graph.node(id);

    if !with_cancel(cancel, docker.is_running(&node.name)).await? {
        debug!(container = %node.name, "Container already stopped, skipping");
        return Ok(());
    }

    let timeout = node.stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
    info!(container = %node.name, timeout, "Stopping container");

    with_cancel(cancel, docker.stop_container(&node.id, timeout)).await?;

    info!(container = %node.name, "Container stopped successfully");
    Ok(())
}

/// Polls a container's health until it reports healthy, the wait times out,
/// or the operation is cancelled. Timeouts and polling errors are
/// non-fatal.
async fn wait_for_healthy(
    docker: &dyn ContainerApi,
    name: &str,
    cancel: &CancellationToken,
) -> Result<(), OrchestratorError> {
    info!(container = %name, "Waiting for container to become healthy");

    let deadline = tokio::time::Instant::now() + HEALTH_WAIT_TIMEOUT;
    let mut ticker = tokio::time::interval(HEALTH_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(container = %name, "Health check timeout, continuing anyway");
                return Ok(());
            }
            _ = ticker.tick() => {
                match docker.health_status(name).await {
                    Err(err) => {
                        debug!(
                            container = %name,
                            error = %err,
                            "Failed to get health status, retrying"
                        );
                    }
                    Ok(status) => {
                        debug!(container = %name, status = %status, "Health check status");
                        if status == HealthStatus::Healthy {
                            info!(container = %name, "Container is healthy");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::testing::{MockContainer, MockDocker};

    fn orchestrator(docker: MockDocker) -> (Arc<MockDocker>, Orchestrator) {
        let docker = Arc::new(docker);
        (docker.clone(), Orchestrator::new(docker))
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[tokio::test]
    async fn chain_starts_in_dependency_order() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("a", &[]),
            MockContainer::managed("b", &["a"]),
            MockContainer::managed("c", &["b"]),
        ]));

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(sorted(result.started), vec!["a", "b", "c"]);
        assert!(result.skipped.is_empty());
        assert!(result.failed.is_empty());

        // Batch barriers make the start order deterministic for a chain.
        assert_eq!(docker.started_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn each_container_is_started_at_most_once() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("a", &[]),
            MockContainer::managed("b", &["a"]),
            MockContainer::managed("c", &["a"]),
            MockContainer::managed("d", &["b", "c"]),
        ]));

        orch.start_containers(StartOptions {
            timeout: 60,
            ignore: vec![],
        })
        .await
        .unwrap();

        let mut calls = docker.started_names();
        calls.sort();
        calls.dedup();
        assert_eq!(calls.len(), 4);
        assert_eq!(docker.started_names().len(), 4);
    }

    #[tokio::test]
    async fn running_container_is_a_no_op_start() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![MockContainer::managed(
            "already-up",
            &[],
        )
        .running()]));

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(result.started, vec!["already-up"]);
        assert!(docker.started_names().is_empty());
    }

    #[tokio::test]
    async fn ignored_containers_are_skipped() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("keep", &[]).running(),
            MockContainer::managed("leave-alone", &[]).running(),
        ]));

        let result = orch
            .stop_containers(StopOptions {
                timeout: 60,
                ignore: vec!["leave-alone".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(result.stopped, vec!["keep"]);
        assert_eq!(result.skipped, vec!["leave-alone"]);
        assert!(result.failed.is_empty());
        assert_eq!(docker.stopped_names(), vec!["keep"]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let (docker, orch) = orchestrator(
            MockDocker::new(vec![
                MockContainer::managed("good", &[]),
                MockContainer::managed("bad", &[]),
            ])
            .failing_start("bad"),
        );

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(result.started, vec!["good"]);
        assert_eq!(result.failed, vec!["bad"]);
        assert_eq!(docker.started_names(), vec!["good"]);
    }

    #[tokio::test]
    async fn cycle_aborts_before_any_container_action() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("a", &["c"]),
            MockContainer::managed("b", &["a"]),
            MockContainer::managed("c", &["b"]),
        ]));

        let err = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap_err();

        match err {
            OrchestratorError::Graph(GraphError::Cycle { cycle }) => {
                assert!(cycle.contains(&"a".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }

        assert!(docker.started_names().is_empty());
        assert!(docker.stopped_names().is_empty());
    }

    #[tokio::test]
    async fn stop_uses_configured_timeout_or_default() {
        let mut configured = MockContainer::managed("configured", &[]).running();
        configured.stop_timeout = Some(30);

        let (docker, orch) = orchestrator(MockDocker::new(vec![
            configured,
            MockContainer::managed("default", &[]).running(),
        ]));

        orch.stop_containers(StopOptions {
            timeout: 60,
            ignore: vec![],
        })
        .await
        .unwrap();

        let calls = docker.stop_calls.lock().unwrap().clone();
        let timeout_of = |name: &str| {
            calls
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| *t)
                .unwrap()
        };

        assert_eq!(timeout_of("configured"), 30);
        assert_eq!(timeout_of("default"), 10);
    }

    #[tokio::test]
    async fn stop_reverses_dependency_order() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("a", &[]).running(),
            MockContainer::managed("b", &["a"]).running(),
            MockContainer::managed("c", &["b"]).running(),
        ]));

        let result = orch
            .stop_containers(StopOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(sorted(result.stopped), vec!["a", "b", "c"]);
        assert_eq!(docker.stopped_names(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn health_gate_without_parent_check_still_starts_child() {
        let mut child = MockContainer::managed("child", &["parent"]);
        child.labels.insert(
            "com.github.saltbox.depends_on.healthchecks".to_string(),
            "true".to_string(),
        );

        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("parent", &[]),
            child,
        ]));

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(sorted(result.started), vec!["child", "parent"]);
        assert!(result.failed.is_empty());
        assert_eq!(docker.started_names(), vec!["parent", "child"]);
    }

    #[tokio::test]
    async fn health_gate_proceeds_once_parent_is_healthy() {
        let mut parent = MockContainer::managed("parent", &[]);
        parent.has_health_check = true;
        parent.health = HealthStatus::Healthy;

        let mut child = MockContainer::managed("child", &["parent"]);
        child.labels.insert(
            "com.github.saltbox.depends_on.healthchecks".to_string(),
            "true".to_string(),
        );

        let (docker, orch) = orchestrator(MockDocker::new(vec![parent, child]));

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(sorted(result.started), vec!["child", "parent"]);
        assert_eq!(docker.started_names(), vec!["parent", "child"]);
    }

    #[tokio::test]
    async fn independent_components_both_complete() {
        let (docker, orch) = orchestrator(MockDocker::new(vec![
            MockContainer::managed("a", &[]),
            MockContainer::managed("b", &["a"]),
            MockContainer::managed("x", &[]),
            MockContainer::managed("y", &["x"]),
        ]));

        let result = orch
            .start_containers(StartOptions {
                timeout: 60,
                ignore: vec![],
            })
            .await
            .unwrap();

        assert_eq!(sorted(result.started), vec!["a", "b", "x", "y"]);

        // Within each component the chain order holds.
        let calls = docker.started_names();
        let pos = |name: &str| calls.iter().position(|n| n == name).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("x") < pos("y"));
    }
}
