//! Graph Nodes
//!
//! This module defines the serializable node and graph types.

use serde::{Deserialize, Serialize};

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A root observable. Its value is transmitted during hydration.
    Root,

    /// A derived observable. Its value is recomputed on the client.
    Derived,
}

/// One observable in a render pass, numbered by registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Registration index; equals the node's position in the graph.
    pub id: usize,

    /// Registration indices of this node's parents, in parent-list order.
    pub parent_ids: Vec<usize>,
}

impl GraphNode {
    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        if self.parent_ids.is_empty() {
            NodeKind::Root
        } else {
            NodeKind::Derived
        }
    }

    /// Whether this node has no parents.
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

/// Integer-indexed dependency graph for one render pass.
///
/// `nodes[i].id == i` always holds for graphs built by
/// [`build_graph`](super::build_graph).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Nodes in registration order.
    pub nodes: Vec<GraphNode>,

    /// Ids of nodes with no parents.
    pub root_ids: Vec<usize>,
}

impl DependencyGraph {
    /// Get a node by id.
    pub fn node(&self, id: usize) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Get the total number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow a path of parent positions from `start`.
    ///
    /// Returns the id reached, or `None` if a step is out of range.
    pub fn walk(&self, start: usize, path: &[usize]) -> Option<usize> {
        path.iter().try_fold(start, |id, &position| {
            self.node(id)?.parent_ids.get(position).copied()
        })
    }
}
