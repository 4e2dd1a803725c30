use super::sort::GraphError;
use super::types::{Graph, NodeId};

/// A single connected component with its parallel-safe batches.
#[derive(Debug)]
pub struct ComponentBatches {
    pub batches: Vec<Vec<NodeId>>,
}

impl ComponentBatches {
    #[allow(dead_code)]
    pub fn node_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

impl Graph {
    /// Splits the graph into independent subgraphs. Each component is a set
    /// of containers connected through dependencies, directly or indirectly;
    /// containers in different components can be processed in parallel.
    ///
    /// Each component carries its startup batches; nodes within one batch
    /// have no dependencies on each other.
    pub fn connected_components(&self) -> Result<Vec<ComponentBatches>, GraphError> {
        let mut visited = vec![false; self.len()];
        let mut components = Vec::new();

        for id in self.node_ids() {
            if !visited[id] && !self.node(id).is_placeholder {
                let members = self.find_component(id, &mut visited);
                if !members.is_empty() {
                    components.push(ComponentBatches {
                        batches: self.component_batches(&members)?,
                    });
                }
            }
        }

        Ok(components)
    }

    /// Components with each component's batches reversed for shutdown.
    pub fn connected_components_for_shutdown(&self) -> Result<Vec<ComponentBatches>, GraphError> {
        let mut components = self.connected_components()?;
        for component in &mut components {
            component.batches.reverse();
        }
        Ok(components)
    }

    /// Iterative DFS over the undirected parent/child relation, collecting
    /// every real node reachable from `start`.
    fn find_component(&self, start: NodeId, visited: &mut [bool]) -> Vec<NodeId> {
        let mut members = Vec::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            if visited[id] || self.node(id).is_placeholder {
                continue;
            }
            visited[id] = true;
            members.push(id);

            for &parent in &self.node(id).parents {
                if !visited[parent] && !self.node(parent).is_placeholder {
                    stack.push(parent);
                }
            }
            for &child in &self.node(id).children {
                if !visited[child] && !self.node(child).is_placeholder {
                    stack.push(child);
                }
            }
        }

        members
    }

    /// Batch layering restricted to one component's members.
    fn component_batches(&self, members: &[NodeId]) -> Result<Vec<Vec<NodeId>>, GraphError> {
        if let Some(cycle) = self.cycle_from(members.iter().copied()) {
            return Err(GraphError::Cycle { cycle });
        }

        let mut visited = vec![false; self.len()];
        let mut order = Vec::with_capacity(members.len());
        for &id in members {
            self.component_sort_visit(id, &mut visited, &mut order);
        }

        Ok(self.layer_batches(&order))
    }

    fn component_sort_visit(&self, id: NodeId, visited: &mut [bool], order: &mut Vec<NodeId>) {
        if visited[id] {
            return;
        }
        visited[id] = true;

        for &parent in &self.node(id).parents {
            self.component_sort_visit(parent, visited, order);
        }

        if !self.node(id).is_placeholder {
            order.push(id);
        }
    }
}
