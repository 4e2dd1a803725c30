use std::collections::HashMap;

use crate::docker::{ContainerLabels, ManagedContainer};

/// Index of a node in the graph's arena.
pub type NodeId = usize;

/// One container in the dependency graph. Parents and children are arena
/// indices; the graph keeps both directions consistent.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub is_running: bool,
    /// True if the container doesn't exist but is referenced as a dependency.
    pub is_placeholder: bool,
    /// Containers this one depends on (must start first).
    pub parents: Vec<NodeId>,
    /// Containers that depend on this one (start after).
    pub children: Vec<NodeId>,
    /// Delay in seconds after dependencies are ready.
    pub startup_delay: u64,
    /// Wait for parent health checks to pass before starting.
    pub wait_for_healthcheck: bool,
    /// Configured stop timeout in seconds (None = Docker default of 10s).
    pub stop_timeout: Option<i64>,
}

impl Node {
    pub fn from_container(container: &ManagedContainer, labels: &ContainerLabels) -> Self {
        Self {
            id: container.id.clone(),
            name: container.name.clone(),
            labels: container.labels.clone(),
            is_running: container.is_running(),
            is_placeholder: false,
            parents: Vec::new(),
            children: Vec::new(),
            startup_delay: labels.depends_on_delay,
            wait_for_healthcheck: labels.depends_on_healthchecks,
            stop_timeout: None,
        }
    }

    /// A node fabricated for a dependency that resolves to no real container.
    pub fn placeholder(name: &str) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            labels: HashMap::new(),
            is_running: false,
            is_placeholder: true,
            parents: Vec::new(),
            children: Vec::new(),
            startup_delay: 0,
            wait_for_healthcheck: false,
            stop_timeout: None,
        }
    }

    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// The complete dependency graph. Nodes live in an arena and are addressed
/// by [`NodeId`]; the name index enforces name uniqueness.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena and returns its id. A node with a duplicate
    /// name replaces the index entry, matching map-insert semantics.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.index.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Records that `child` depends on `parent`, keeping both edge lists in
    /// sync.
    pub fn add_parent(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child].parents.push(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    #[allow(dead_code)]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.node_id(name).map(|id| self.node(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes backed by real containers.
    pub fn real_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_placeholder).count()
    }

    /// All real nodes with no parent dependencies.
    #[allow(dead_code)]
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| !self.nodes[id].has_parents() && !self.nodes[id].is_placeholder)
            .collect()
    }

    /// All real nodes with no children.
    #[allow(dead_code)]
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| !self.nodes[id].has_children() && !self.nodes[id].is_placeholder)
            .collect()
    }

    pub fn names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| self.nodes[id].name.clone()).collect()
    }

    pub(super) fn node_ids(&self) -> std::ops::Range<NodeId> {
        0..self.nodes.len()
    }
}
