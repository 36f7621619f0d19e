//! Graph Codec
//!
//! Converts the ordered list of observables registered during a render pass
//! into an integer-indexed [`DependencyGraph`], and answers "how do I get
//! from this node to a root" as lists of parent positions.
//!
//! # Numbering
//!
//! Index `i` in the input list becomes node id `i`. Server and client
//! register observables in the same order because the same component code
//! runs on both, so node `N` names the same logical observable on both sides
//! without any identity being transmitted.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphError;
use crate::reactive::AnyObservable;

use super::node::{DependencyGraph, GraphNode};

/// Build the graph for an ordered list of observables.
///
/// Every parent must also appear in the list. A missing parent means the
/// registration pass lost an observable, which is reported as
/// [`GraphError::UnregisteredParent`].
pub fn build_graph(observables: &[Arc<dyn AnyObservable>]) -> Result<DependencyGraph, GraphError> {
    let index: HashMap<u64, usize> = observables
        .iter()
        .enumerate()
        .map(|(i, o)| (o.id(), i))
        .collect();

    let mut nodes = Vec::with_capacity(observables.len());
    let mut root_ids = Vec::new();

    for (id, observable) in observables.iter().enumerate() {
        let parent_ids = observable
            .parents()
            .iter()
            .map(|parent| {
                index
                    .get(&parent.id())
                    .copied()
                    .ok_or(GraphError::UnregisteredParent {
                        observable: observable.id(),
                        parent: parent.id(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if parent_ids.is_empty() {
            root_ids.push(id);
        }
        nodes.push(GraphNode { id, parent_ids });
    }

    Ok(DependencyGraph { nodes, root_ids })
}

/// Every path of parent positions from `node_id` to a root.
///
/// Each path lists, per step, which entry of the current node's
/// `parent_ids` to follow. A root yields one empty path. Steps that leave
/// the graph or revisit a node on the current path are skipped, so a
/// malformed graph produces fewer paths rather than looping.
pub fn find_paths_to_roots(graph: &DependencyGraph, node_id: usize) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    if graph.node(node_id).is_none() {
        return paths;
    }

    let mut on_path = vec![false; graph.len()];
    let mut prefix = Vec::new();
    walk(graph, node_id, &mut prefix, &mut on_path, &mut paths);
    paths
}

fn walk(
    graph: &DependencyGraph,
    id: usize,
    prefix: &mut Vec<usize>,
    on_path: &mut [bool],
    paths: &mut Vec<Vec<usize>>,
) {
    let Some(node) = graph.node(id) else {
        return;
    };
    if node.parent_ids.is_empty() {
        paths.push(prefix.clone());
        return;
    }

    on_path[id] = true;
    for (position, &parent) in node.parent_ids.iter().enumerate() {
        if parent >= on_path.len() || on_path[parent] {
            continue;
        }
        prefix.push(position);
        walk(graph, parent, prefix, on_path, paths);
        prefix.pop();
    }
    on_path[id] = false;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    Visiting,
    Visited,
}

/// Check graph integrity.
///
/// Verifies that node ids match positions, every parent id exists, no node
/// reaches itself (three-color DFS, reporting the full cycle), and
/// `root_ids` lists exactly the parentless nodes.
pub fn validate(graph: &DependencyGraph) -> Result<(), GraphError> {
    for (index, node) in graph.nodes.iter().enumerate() {
        if node.id != index {
            return Err(GraphError::MisnumberedNode { index, id: node.id });
        }
        if let Some(&parent) = node.parent_ids.iter().find(|&&p| p >= graph.len()) {
            return Err(GraphError::MissingParent { node: index, parent });
        }
    }

    let mut colors = vec![Color::Unvisited; graph.len()];
    let mut stack = Vec::new();
    for start in 0..graph.len() {
        if colors[start] == Color::Unvisited {
            visit(graph, start, &mut colors, &mut stack)?;
        }
    }

    for &root in &graph.root_ids {
        match graph.node(root) {
            None => return Err(GraphError::OutOfRange(root)),
            Some(node) if !node.is_root() => return Err(GraphError::FalseRoot(root)),
            Some(_) => {}
        }
    }
    if let Some(node) = graph
        .nodes
        .iter()
        .find(|n| n.is_root() && !graph.root_ids.contains(&n.id))
    {
        return Err(GraphError::MissingRoot(node.id));
    }

    Ok(())
}

fn visit(
    graph: &DependencyGraph,
    id: usize,
    colors: &mut [Color],
    stack: &mut Vec<usize>,
) -> Result<(), GraphError> {
    colors[id] = Color::Visiting;
    stack.push(id);

    for &parent in &graph.nodes[id].parent_ids {
        match colors[parent] {
            Color::Visiting => {
                let start = stack.iter().position(|&n| n == parent).unwrap_or(0);
                let mut path = stack[start..].to_vec();
                path.push(parent);
                return Err(GraphError::Cycle { path });
            }
            Color::Unvisited => visit(graph, parent, colors, stack)?,
            Color::Visited => {}
        }
    }

    stack.pop();
    colors[id] = Color::Visited;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;

    fn node(id: usize, parent_ids: Vec<usize>) -> GraphNode {
        GraphNode { id, parent_ids }
    }

    #[test]
    fn build_numbers_by_list_position() {
        let a = Observable::new_sync(1);
        let b = Observable::new_sync(2);
        let sum = {
            let parents = [a.erased(), b.erased()];
            let (a, b) = (a.clone(), b.clone());
            Observable::merge_from(move || a.get() + b.get(), parents).unwrap()
        };
        let label = sum.derive(|n| n.to_string());

        let list = vec![a.erased(), b.erased(), sum.erased(), label.erased()];
        let graph = build_graph(&list).unwrap();

        assert_eq!(graph.root_ids, vec![0, 1]);
        assert_eq!(graph.nodes[2].parent_ids, vec![0, 1]);
        assert_eq!(graph.nodes[3].parent_ids, vec![2]);
        validate(&graph).unwrap();
    }

    #[test]
    fn build_fails_on_unregistered_parent() {
        let root = Observable::new_sync(1);
        let derived = root.derive(|n| n + 1);

        let err = build_graph(&[derived.erased()]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnregisteredParent {
                observable: derived.id(),
                parent: root.id(),
            }
        );
    }

    #[test]
    fn paths_cover_every_parent_chain() {
        // 0   1
        // |\ /
        // 2 3
        //  \|
        //   4
        let graph = DependencyGraph {
            nodes: vec![
                node(0, vec![]),
                node(1, vec![]),
                node(2, vec![0]),
                node(3, vec![0, 1]),
                node(4, vec![2, 3]),
            ],
            root_ids: vec![0, 1],
        };

        let paths = find_paths_to_roots(&graph, 4);
        assert_eq!(paths, vec![vec![0, 0], vec![1, 0], vec![1, 1]]);
        for path in &paths {
            let end = graph.walk(4, path).unwrap();
            assert!(graph.root_ids.contains(&end));
        }

        assert_eq!(find_paths_to_roots(&graph, 0), vec![Vec::<usize>::new()]);
        assert!(find_paths_to_roots(&graph, 99).is_empty());
    }

    #[test]
    fn paths_skip_cycles_instead_of_looping() {
        let graph = DependencyGraph {
            nodes: vec![node(0, vec![]), node(1, vec![2, 0]), node(2, vec![1])],
            root_ids: vec![0],
        };
        assert_eq!(find_paths_to_roots(&graph, 2), vec![vec![0, 1]]);
    }

    #[test]
    fn validate_reports_full_cycle() {
        let graph = DependencyGraph {
            nodes: vec![node(0, vec![2]), node(1, vec![0]), node(2, vec![1])],
            root_ids: vec![],
        };
        assert_eq!(
            validate(&graph),
            Err(GraphError::Cycle { path: vec![0, 2, 1, 0] })
        );
    }

    #[test]
    fn validate_checks_references_and_roots() {
        let dangling = DependencyGraph {
            nodes: vec![node(0, vec![5])],
            root_ids: vec![],
        };
        assert_eq!(
            validate(&dangling),
            Err(GraphError::MissingParent { node: 0, parent: 5 })
        );

        let false_root = DependencyGraph {
            nodes: vec![node(0, vec![]), node(1, vec![0])],
            root_ids: vec![0, 1],
        };
        assert_eq!(validate(&false_root), Err(GraphError::FalseRoot(1)));

        let missing_root = DependencyGraph {
            nodes: vec![node(0, vec![])],
            root_ids: vec![],
        };
        assert_eq!(validate(&missing_root), Err(GraphError::MissingRoot(0)));
    }
}
