//! Error Types
//!
//! Errors are split by how they propagate:
//!
//! - [`Error`] covers programmer misuse and codec failures. These are
//!   returned from the call that caused them.
//! - [`GraphError`] covers dependency-graph invariant violations. A missing
//!   parent during `build_graph` means the registration pass lost an
//!   observable, which is a bug, so it is loud.
//! - [`HydrationError`] covers stale or mismatched hydration data. These are
//!   never returned as `Err` from hydration; they are collected into a
//!   report and logged so the page keeps working.

use thiserror::Error;

use crate::dom::NodeId;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced synchronously at the call site.
#[derive(Debug, Error)]
pub enum Error {
    /// A derived observable was assigned from outside its recompute path.
    #[error("cannot set derived value (observable {id})")]
    DerivedAssignment { id: u64 },

    /// `merge_from` was called with an empty parent list.
    #[error("at least one dependency required")]
    NoDependencies,

    /// Fragment start and end markers live under different parents.
    #[error("fragment markers {start:?} and {end:?} do not share a parent")]
    MarkerParentMismatch { start: NodeId, end: NodeId },

    /// A reference node passed to a fragment operation is not inside it.
    #[error("node {node:?} is not inside fragment {fragment}")]
    NotInFragment { node: NodeId, fragment: u64 },

    /// A reference node is not a child of the parent it was used with.
    #[error("node {node:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, node: NodeId },

    /// A DOM operation was given a node that cannot take children.
    #[error("node {0:?} cannot have children")]
    NotAContainer(NodeId),

    /// Inserting the node would make it its own ancestor.
    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle { parent: NodeId, child: NodeId },

    /// The render context was used after it was closed.
    #[error("render context {0} is closed")]
    ContextClosed(u64),

    /// Markup handed to the parser is malformed.
    #[error("html parse error at byte {offset}: {message}")]
    Html { offset: usize, message: String },

    /// A cleanup thunk failed during `destroy`.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// An observer panicked while a batch was being flushed.
    #[error("observer panicked: {0}")]
    Observer(String),

    /// Dependency graph invariant violation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// JSON encoding or decoding failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("msgpack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("msgpack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Dependency graph invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An observable's parent was not registered in the same pass.
    #[error("observable {observable} has parent {parent} that was not registered in this pass")]
    UnregisteredParent { observable: u64, parent: u64 },

    /// A node references a parent index that does not exist.
    #[error("node {node} references missing parent {parent}")]
    MissingParent { node: usize, parent: usize },

    /// A node id does not match its array position.
    #[error("node at index {index} carries id {id}")]
    MisnumberedNode { index: usize, id: usize },

    /// A node can reach itself by following parent ids.
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle { path: Vec<usize> },

    /// A node listed as a root has parents.
    #[error("node {0} is listed as a root but has parents")]
    FalseRoot(usize),

    /// A node with no parents is missing from the root list.
    #[error("node {0} has no parents but is not listed as a root")]
    MissingRoot(usize),

    /// A node id is outside the graph.
    #[error("node {0} is out of range")]
    OutOfRange(usize),
}

fn format_cycle(path: &[usize]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Recoverable hydration mismatches.
///
/// Each one means the affected subtree keeps its freshly computed client
/// value instead of the transmitted one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HydrationError {
    /// The payload has no bindings for a stable element id.
    #[error("no bindings recorded for element {0}")]
    NoBindings(String),

    /// The payload names an observable the client never constructed.
    #[error("element {element}: observable {observable} is not in the client registry")]
    MissingRegistryEntry { element: String, observable: usize },

    /// A stored parent path walked off the end of a parent list.
    #[error("element {element}: path {path:?} leaves the graph at step {step}")]
    PathOutOfRange { element: String, path: Vec<usize>, step: usize },

    /// A path ended on an observable that still has parents.
    #[error("element {element}: path {path:?} ends on a derived observable")]
    NonRootTerminal { element: String, path: Vec<usize> },

    /// The payload carries no value for a root the path reached.
    #[error("no transmitted value for root {0}")]
    MissingRootValue(usize),

    /// A transmitted value does not decode into the root's type.
    #[error("root {root}: {message}")]
    ValueDecode { root: usize, message: String },

    /// No DOM node carries the stable element id.
    #[error("no server node carries element id {0}")]
    MissingElement(String),

    /// Fragment markers were absent or under different parents.
    #[error("fragment {0}: boundary markers not found under one parent")]
    MissingMarkers(u64),

    /// Server nodes inside a keyed list matched no client entry and were
    /// removed.
    #[error("fragment {fragment}: removed {removed} server nodes no list entry owns")]
    UnownedNodes { fragment: u64, removed: usize },

    /// The transmitted graph is internally inconsistent.
    #[error("transmitted graph is invalid: {0}")]
    InvalidGraph(GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_full_path() {
        let err = GraphError::Cycle { path: vec![1, 2, 3, 1] };
        assert_eq!(err.to_string(), "dependency cycle: 1 -> 2 -> 3 -> 1");
    }

    #[test]
    fn graph_error_converts_into_crate_error() {
        let err: Error = GraphError::FalseRoot(4).into();
        assert!(matches!(err, Error::Graph(GraphError::FalseRoot(4))));
    }
}
