use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::docker::{ContainerApi, ContainerLabels, ManagedContainer};

use super::types::{Graph, Node};

/// Constructs dependency graphs from the daemon's current container view.
pub struct GraphBuilder {
    docker: Arc<dyn ContainerApi>,
}

impl GraphBuilder {
    pub fn new(docker: Arc<dyn ContainerApi>) -> Self {
        Self { docker }
    }

    /// Builds the graph in two passes: nodes for every orchestrated
    /// container, then dependency edges, synthesizing placeholders for
    /// dependencies that resolve to no real container. Cycle validation is
    /// left to the caller.
    pub async fn build(&self, containers: &[ManagedContainer]) -> Graph {
        let mut graph = Graph::new();

        for container in containers {
            let labels = ContainerLabels::parse(&container.labels);

            if !labels.is_managed() {
                debug!(container = %container.name, "Skipping unmanaged container");
                continue;
            }

            let mut node = Node::from_container(container, &labels);

            // One inspect per node to pick up the configured stop timeout.
            match self.docker.inspect(&container.id).await {
                Ok(details) => node.stop_timeout = details.stop_timeout,
                Err(err) => warn!(
                    container = %container.name,
                    error = %err,
                    "Failed to inspect container for stop timeout"
                ),
            }

            debug!(
                container = %node.name,
                startup_delay = node.startup_delay,
                wait_healthcheck = node.wait_for_healthcheck,
                stop_timeout = ?node.stop_timeout,
                "Added container to graph"
            );
            graph.insert(node);
        }

        for container in containers {
            let Some(child) = graph.node_id(&container.name) else {
                continue;
            };

            let labels = ContainerLabels::parse(&container.labels);
            for dependency in &labels.depends_on {
                let parent = match graph.node_id(dependency) {
                    Some(parent) => parent,
                    None => {
                        warn!(
                            container = %container.name,
                            dependency = %dependency,
                            "Dependency not found, creating placeholder"
                        );
                        graph.insert(Node::placeholder(dependency))
                    }
                };

                graph.add_parent(child, parent);

                debug!(
                    container = %container.name,
                    depends_on = %dependency,
                    placeholder = graph.node(parent).is_placeholder,
                    "Added dependency"
                );
            }
        }

        info!(
            total_nodes = graph.len(),
            managed_containers = graph.real_node_count(),
            "Dependency graph built"
        );

        graph
    }
}
