use thiserror::Error;

use super::types::{Graph, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("no containers to sort")]
    Empty,
}

/// Result of a topological sort over the graph.
#[derive(Debug)]
pub struct SortedNodes {
    /// Order for starting containers (dependencies first).
    pub startup_order: Vec<NodeId>,
    /// Order for stopping containers (reverse of startup).
    #[allow(dead_code)]
    pub shutdown_order: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl Graph {
    /// Looks for a directed cycle in the dependency relation. Returns one
    /// witness as the node names along the cycle, oriented from the walk's
    /// entry point to the back-edge target.
    pub fn has_cycle(&self) -> Option<Vec<String>> {
        self.cycle_from(self.node_ids())
    }

    pub(super) fn cycle_from(
        &self,
        seeds: impl IntoIterator<Item = NodeId>,
    ) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut cycle = Vec::new();

        for seed in seeds {
            if marks[seed] == Mark::Unvisited && self.cycle_dfs(seed, &mut marks, &mut cycle) {
                // Collected on unwind; reverse to read along the edges.
                cycle.reverse();
                return Some(cycle);
            }
        }

        None
    }

    fn cycle_dfs(&self, id: NodeId, marks: &mut [Mark], cycle: &mut Vec<String>) -> bool {
        match marks[id] {
            Mark::OnStack => {
                cycle.push(self.node(id).name.clone());
                return true;
            }
            Mark::Done => return false,
            Mark::Unvisited => {}
        }

        marks[id] = Mark::OnStack;

        for &child in &self.node(id).children {
            if self.cycle_dfs(child, marks, cycle) {
                cycle.push(self.node(id).name.clone());
                return true;
            }
        }

        marks[id] = Mark::Done;
        false
    }

    /// Rejects graphs that are not a DAG.
    pub fn validate(&self) -> Result<(), GraphError> {
        match self.has_cycle() {
            Some(cycle) => Err(GraphError::Cycle { cycle }),
            None => Ok(()),
        }
    }

    /// Topologically sorts the real nodes, dependencies first. Placeholders
    /// are walked but never emitted.
    pub fn topological_sort(&self) -> Result<SortedNodes, GraphError> {
        self.validate()?;

        let mut visited = vec![false; self.len()];
        let mut startup_order = Vec::with_capacity(self.real_node_count());

        for id in self.node_ids() {
            if !visited[id] && !self.node(id).is_placeholder {
                self.sort_visit(id, &mut visited, &mut startup_order);
            }
        }

        if startup_order.is_empty() {
            return Err(GraphError::Empty);
        }

        let shutdown_order = startup_order.iter().rev().copied().collect();

        Ok(SortedNodes {
            startup_order,
            shutdown_order,
        })
    }

    fn sort_visit(&self, id: NodeId, visited: &mut [bool], order: &mut Vec<NodeId>) {
        if visited[id] {
            return;
        }
        visited[id] = true;

        for &parent in &self.node(id).parents {
            self.sort_visit(parent, visited, order);
        }

        if !self.node(id).is_placeholder {
            order.push(id);
        }
    }

    /// Groups real nodes into batches that can start in parallel: batch `i`
    /// holds every node whose longest real-parent chain has length `i`.
    pub fn startup_batches(&self) -> Result<Vec<Vec<NodeId>>, GraphError> {
        let sorted = self.topological_sort()?;
        Ok(self.layer_batches(&sorted.startup_order))
    }

    /// Reverse of the startup batches, with each batch's membership kept.
    #[allow(dead_code)]
    pub fn shutdown_batches(&self) -> Result<Vec<Vec<NodeId>>, GraphError> {
        let mut batches = self.startup_batches()?;
        batches.reverse();
        Ok(batches)
    }

    /// Layers a topologically ordered node list by longest-parent-chain
    /// depth. Placeholder parents contribute no depth.
    pub(super) fn layer_batches(&self, startup_order: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut depths = vec![0usize; self.len()];
        let mut max_depth = 0;

        for &id in startup_order {
            let depth = self
                .node(id)
                .parents
                .iter()
                .filter(|&&parent| !self.node(parent).is_placeholder)
                .map(|&parent| depths[parent] + 1)
                .max()
                .unwrap_or(0);

            depths[id] = depth;
            max_depth = max_depth.max(depth);
        }

        let mut batches = vec![Vec::new(); max_depth + 1];
        for &id in startup_order {
            batches[depths[id]].push(id);
        }

        batches
    }
}
