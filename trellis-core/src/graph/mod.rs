//! Dependency Graph
//!
//! This module implements the numeric encoding of observable relationships
//! that travels from server to client.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are the observables registered during one render pass, numbered
//!   by registration order
//! - Edges point from a derived node to each of its parents
//!
//! Alongside the graph, each reactive DOM property carries the list of
//! parent-position paths from its bound observable to the roots. The client
//! walks those paths through its own live observables to find which roots
//! to overwrite with transmitted values.
//!
//! # Design Decisions
//!
//! 1. Array index is the node id. Nothing else identifies an observable
//!    across the wire.
//!
//! 2. Paths are parent *positions*, not node ids, so the client can follow
//!    them through `parents()` lists without consulting the graph.
//!
//! 3. `validate` runs on decoded payloads before hydration. The server
//!    builds graphs that are valid by construction and never calls it.

mod codec;
mod node;

pub use codec::{build_graph, find_paths_to_roots, validate};
pub use node::{DependencyGraph, GraphNode, NodeKind};
