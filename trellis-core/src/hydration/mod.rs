//! Server Rendering and Hydration
//!
//! A component is a function from a [`Document`] to a view. The same
//! function runs twice:
//!
//! 1. On the server, inside [`SsrRenderer::render`]. Every observable it
//!    creates is registered, every element with a dynamic property gets a
//!    stable id, and the pass ends with HTML plus a [`HydrationPayload`].
//! 2. On the client, inside [`hydrate`]. Creation order is the same, so
//!    registry indices and element ids line up with the server's. Elements
//!    adopt their server nodes, transmitted root values are written before
//!    any binding reads, and nothing is re-created.
//!
//! [`mount`] is the third way in: plain client rendering into a container,
//! with no server markup to adopt.
//!
//! Mismatches never abort hydration. They are collected in the returned
//! [`HydrationReport`] and the affected parts fall back to client values.

mod context;
mod payload;
mod reconcile;
mod ssr;

pub use context::{RenderContext, RenderMode};
pub use payload::{ElementBinding, HydrationPayload};
pub use reconcile::{reconcile_element, HydrationReport};
pub use ssr::{SsrOutput, SsrRenderer};

use crate::config::RuntimeConfig;
use crate::dom::{Document, NodeId, View};
use crate::error::{HydrationError, Result};
use crate::graph;

/// Run `component` against server markup under `root`.
///
/// The component's return value is handed back untouched; its nodes are
/// already in place. An invalid transmitted graph is reported and the pass
/// continues with no transmitted state, so every binding keeps its client
/// value.
pub fn hydrate<F, R>(
    document: &Document,
    root: NodeId,
    payload: HydrationPayload,
    config: RuntimeConfig,
    component: F,
) -> (R, HydrationReport)
where
    F: FnOnce(&Document) -> R,
{
    let (payload, invalid) = match graph::validate(&payload.graph) {
        Ok(()) => (payload, None),
        Err(err) => (HydrationPayload::default(), Some(err)),
    };

    let cx = RenderContext::hydrating(config, document, root, payload);
    if let Some(err) = invalid {
        cx.report_mismatch(HydrationError::InvalidGraph(err));
    }

    let output = cx.enter(|| component(document));
    let report = cx.report();
    cx.close();

    tracing::debug!(
        pass_id = cx.pass_id(),
        elements = report.elements.len(),
        hydrated = report.hydrated_roots.len(),
        mismatches = report.mismatches.len(),
        "hydration finished"
    );
    (output, report)
}

/// Render `component` on the client and insert it into `container`.
pub fn mount<F>(document: &Document, container: NodeId, config: RuntimeConfig, component: F) -> Result<View>
where
    F: FnOnce(&Document) -> Result<View>,
{
    let cx = RenderContext::client(config);
    let mounted = cx.enter(|| {
        let view = component(document)?;
        view.insert(document, container, None)?;
        Ok(view)
    });
    cx.close();
    mounted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementBuilder;
    use crate::error::GraphError;
    use crate::graph::GraphNode;
    use crate::reactive::Observable;

    fn counter(doc: &Document, start: i64) -> Result<(Observable<i64>, NodeId)> {
        let count = Observable::new(start);
        let label = count.derive(|n| format!("Count: {n}"));
        let node = ElementBuilder::new("p").text(&label).build(doc)?;
        Ok((count, node))
    }

    #[test]
    fn hydration_adopts_server_nodes() {
        let output = SsrRenderer::default()
            .render(|doc| counter(doc, 5).map(|(_, node)| View::Node(node)))
            .unwrap();

        let document = Document::from_html(&format!("<div>{}</div>", output.html)).unwrap();
        let server_node = document.find_by_attribute(document.root(), "data-hk", "0");
        document.stats().reset();
        let ((count, node), report) = hydrate(
            &document,
            document.root(),
            output.payload,
            RuntimeConfig::default(),
            |doc| counter(doc, 0).unwrap(),
        );

        assert!(report.is_clean());
        assert_eq!(count.get(), 5);
        assert_eq!(document.text_content(node), "Count: 5");
        assert_eq!(server_node, Some(node));
        assert_eq!(document.stats().created(), 0);
    }

    #[test]
    fn invalid_graph_falls_back_to_client_values() {
        let document = Document::from_html(r#"<p data-hk="0">Count: 9</p>"#).unwrap();
        let mut payload = HydrationPayload::default();
        payload.graph.nodes.push(GraphNode { id: 0, parent_ids: vec![0] });

        let ((count, node), report) = hydrate(
            &document,
            document.root(),
            payload,
            RuntimeConfig::default(),
            |doc| counter(doc, 1).unwrap(),
        );

        assert_eq!(count.get(), 1);
        assert_eq!(document.text_content(node), "Count: 1");
        assert!(matches!(
            report.mismatches[0],
            HydrationError::InvalidGraph(GraphError::Cycle { .. })
        ));
        assert_eq!(report.mismatches[1], HydrationError::NoBindings("0".into()));
    }

    #[test]
    fn mount_renders_into_a_container() {
        let document = Document::new();
        let container = document.create_element("main");
        document.append_child(document.root(), container).unwrap();

        mount(&document, container, RuntimeConfig::default(), |doc| {
            counter(doc, 3).map(|(_, node)| View::Node(node))
        })
        .unwrap();

        assert_eq!(
            document.inner_html(container),
            r#"<p>Count: 3</p>"#
        );
    }
}
