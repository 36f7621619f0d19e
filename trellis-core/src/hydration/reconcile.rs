//! Hydration Reconciler
//!
//! Matches live client observables to transmitted server state.
//!
//! Client code runs the same component in the same order as the server, so
//! registry index `N` on the client is node `N` of the transmitted graph.
//! For an element id the reconciler takes each recorded binding, resolves
//! the bound observable by index, and walks each stored path through
//! `parents()` to a root. The transmitted value is written into that root
//! silently and its derived descendants are recomputed at once, so the first
//! bound read already reflects server state.
//!
//! Nothing here fails the page. Every mismatch becomes a
//! [`HydrationError`] in the [`HydrationReport`] and a `warn!` line, and the
//! affected binding keeps its freshly computed client value.

use std::sync::Arc;

use super::payload::HydrationPayload;
use crate::error::HydrationError;
use crate::reactive::AnyObservable;

/// Outcome of a hydration pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationReport {
    /// Element ids whose bindings were processed.
    pub elements: Vec<String>,

    /// Node ids of roots whose value was overwritten.
    pub hydrated_roots: Vec<usize>,

    /// Roots whose transmitted value already matched the client default.
    pub unchanged_roots: Vec<usize>,

    /// Every recoverable mismatch, in the order found.
    pub mismatches: Vec<HydrationError>,
}

impl HydrationReport {
    /// Whether the pass found no mismatches.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    fn seen(&self, root: usize) -> bool {
        self.hydrated_roots.contains(&root) || self.unchanged_roots.contains(&root)
    }

    fn mismatch(&mut self, error: HydrationError) {
        tracing::warn!(%error, "hydration mismatch");
        self.mismatches.push(error);
    }
}

/// Hydrate the roots behind every binding recorded for `element_id`.
pub fn reconcile_element(
    payload: &HydrationPayload,
    registry: &[Arc<dyn AnyObservable>],
    element_id: &str,
    report: &mut HydrationReport,
) {
    let Some(bindings) = payload.bindings(element_id) else {
        report.mismatch(HydrationError::NoBindings(element_id.to_string()));
        return;
    };
    report.elements.push(element_id.to_string());

    for binding in bindings {
        let Some(bound) = registry.get(binding.observable_numeric_id) else {
            report.mismatch(HydrationError::MissingRegistryEntry {
                element: element_id.to_string(),
                observable: binding.observable_numeric_id,
            });
            continue;
        };

        for path in &binding.paths_to_roots {
            let root = match walk(bound, path) {
                Ok(root) => root,
                Err(step) => {
                    report.mismatch(HydrationError::PathOutOfRange {
                        element: element_id.to_string(),
                        path: path.clone(),
                        step,
                    });
                    continue;
                }
            };
            if root.is_derived() {
                report.mismatch(HydrationError::NonRootTerminal {
                    element: element_id.to_string(),
                    path: path.clone(),
                });
                continue;
            }

            // The transmitted graph names the same node the client walk reached.
            let Some(node) = payload.graph.walk(binding.observable_numeric_id, path) else {
                report.mismatch(HydrationError::PathOutOfRange {
                    element: element_id.to_string(),
                    path: path.clone(),
                    step: path.len(),
                });
                continue;
            };
            if report.seen(node) {
                continue;
            }
            hydrate_root(payload, &root, node, report);
        }
    }
}

/// Apply the transmitted value for registry index `index`, if the server
/// recorded one.
pub(crate) fn hydrate_registered_root(
    payload: &HydrationPayload,
    root: &Arc<dyn AnyObservable>,
    index: usize,
    report: &mut HydrationReport,
) {
    if payload.root_values.contains_key(&index) && !report.seen(index) {
        hydrate_root(payload, root, index, report);
    }
}

/// Follow parent positions from `start`. `Err` carries the failing step.
fn walk(start: &Arc<dyn AnyObservable>, path: &[usize]) -> Result<Arc<dyn AnyObservable>, usize> {
    let mut current = Arc::clone(start);
    for (step, &position) in path.iter().enumerate() {
        let next = current.parents().get(position).cloned().ok_or(step)?;
        current = next;
    }
    Ok(current)
}

fn hydrate_root(
    payload: &HydrationPayload,
    root: &Arc<dyn AnyObservable>,
    node: usize,
    report: &mut HydrationReport,
) {
    let Some(value) = payload.root_values.get(&node) else {
        report.mismatch(HydrationError::MissingRootValue(node));
        return;
    };
    match root.hydrate_json(value) {
        Ok(true) => {
            tracing::trace!(node, "root hydrated");
            report.hydrated_roots.push(node);
        }
        Ok(false) => report.unchanged_roots.push(node),
        Err(err) => report.mismatch(HydrationError::ValueDecode {
            root: node,
            message: err.to_string(),
        }),
    }
}
