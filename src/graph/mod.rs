mod builder;
mod components;
mod sort;
mod types;

pub use builder::GraphBuilder;
pub use components::ComponentBatches;
pub use sort::{GraphError, SortedNodes};
pub use types::{Graph, Node, NodeId};
