//! Server Rendering
//!
//! One [`RenderContext`] per request: open it, run the component to
//! completion (awaiting any work registered through
//! [`RenderContext::spawn_pending`]), serialize, then close it so nothing
//! leaks into the next request. In-flight passes are tracked in a `DashMap`
//! keyed by pass id.

use dashmap::DashMap;
use futures_util::future::join_all;

use super::context::RenderContext;
use super::payload::HydrationPayload;
use crate::config::RuntimeConfig;
use crate::dom::{Document, View};
use crate::error::Result;

/// Markup and payload from one server pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SsrOutput {
    /// Serialized component markup.
    pub html: String,

    /// Hydration payload for the same pass.
    pub payload: HydrationPayload,
}

impl SsrOutput {
    /// The markup followed by the embedded payload script.
    pub fn to_html_document(&self, config: &RuntimeConfig) -> Result<String> {
        Ok(format!("{}{}", self.html, self.payload.to_script_tag(config)?))
    }
}

/// Closes the pass and forgets it, however the render ended.
struct PassGuard<'a> {
    renderer: &'a SsrRenderer,
    cx: RenderContext,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.cx.close();
        self.renderer.active.remove(&self.cx.pass_id());
    }
}

/// Renders components to HTML plus a hydration payload.
#[derive(Debug, Default)]
pub struct SsrRenderer {
    config: RuntimeConfig,
    active: DashMap<u64, RenderContext>,
}

impl SsrRenderer {
    /// Create a renderer.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            active: DashMap::new(),
        }
    }

    /// The config every pass is opened with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of passes currently rendering.
    pub fn active_passes(&self) -> usize {
        self.active.len()
    }

    fn begin(&self) -> PassGuard<'_> {
        let cx = RenderContext::server(self.config.clone());
        self.active.insert(cx.pass_id(), cx.clone());
        PassGuard { renderer: self, cx }
    }

    /// Render a component synchronously.
    ///
    /// Pending futures registered by the component are dropped unawaited;
    /// use [`SsrRenderer::render_async`] when the component registers any.
    pub fn render<F>(&self, component: F) -> Result<SsrOutput>
    where
        F: FnOnce(&Document) -> Result<View>,
    {
        let pass = self.begin();
        let document = Document::new();
        pass.cx.enter(|| {
            let view = component(&document)?;
            view.insert(&document, document.root(), None)
        })?;
        self.finish(&pass, &document)
    }

    /// Render a component and await everything it registered.
    pub async fn render_async<F>(&self, component: F) -> Result<SsrOutput>
    where
        F: FnOnce(&Document) -> Result<View>,
    {
        let pass = self.begin();
        let document = Document::new();
        pass.cx.enter(|| {
            let view = component(&document)?;
            view.insert(&document, document.root(), None)
        })?;

        // Pending work may register more pending work.
        loop {
            let pending = pass.cx.take_pending();
            if pending.is_empty() {
                break;
            }
            tracing::debug!(pass_id = pass.cx.pass_id(), count = pending.len(), "awaiting pending render work");
            pass.cx.scope(join_all(pending)).await;
        }
        self.finish(&pass, &document)
    }

    fn finish(&self, pass: &PassGuard<'_>, document: &Document) -> Result<SsrOutput> {
        let payload = pass.cx.build_payload()?;
        let html = document.inner_html(document.root());
        tracing::debug!(
            pass_id = pass.cx.pass_id(),
            bytes = html.len(),
            roots = payload.root_values.len(),
            elements = payload.bindings_by_element_id.len(),
            "server render finished"
        );
        Ok(SsrOutput { html, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementBuilder, Fragment};
    use crate::error::Error;
    use crate::reactive::Observable;

    #[test]
    fn static_elements_get_no_id() {
        let renderer = SsrRenderer::default();
        let output = renderer
            .render(|doc| {
                let title = doc.create_text("Hello");
                let node = ElementBuilder::new("h1").child(title).build(doc)?;
                Ok(View::Node(node))
            })
            .unwrap();
        assert_eq!(output.html, "<h1>Hello</h1>");
        assert!(output.payload.bindings_by_element_id.is_empty());
        assert_eq!(renderer.active_passes(), 0);
    }

    #[test]
    fn fragments_and_elements_share_one_id_counter() {
        let renderer = SsrRenderer::default();
        let output = renderer
            .render(|doc| {
                let count = Observable::new(7);
                let fragment = Fragment::new(doc);
                let label = count.derive(|n| format!("{n}"));
                let span = ElementBuilder::new("span").text(&label).build(doc)?;
                fragment.append_child(span)?;
                Ok(View::Fragment(fragment))
            })
            .unwrap();
        assert_eq!(
            output.html,
            r#"<!--s:0--><span data-hk="1">7</span><!--e:0-->"#
        );
        assert_eq!(output.payload.root_values.get(&0), Some(&serde_json::json!(7)));
        assert_eq!(output.payload.bindings("1").unwrap()[0].paths_to_roots, vec![vec![0]]);
    }

    #[test]
    fn failed_render_still_closes_the_pass() {
        let renderer = SsrRenderer::default();
        let leaked = parking_lot::Mutex::new(None);
        let result = renderer.render(|_| {
            *leaked.lock() = Some(Observable::new(1));
            Err(Error::NoDependencies)
        });
        assert!(result.is_err());
        assert_eq!(renderer.active_passes(), 0);
        assert!(leaked.lock().as_ref().unwrap().is_destroyed());
    }

    #[tokio::test]
    async fn render_async_awaits_pending_work() {
        let renderer = SsrRenderer::default();
        let output = renderer
            .render_async(|doc| {
                let status = Observable::new("loading".to_string());
                let node = ElementBuilder::new("p").text(&status).build(doc)?;
                let cx = RenderContext::current().expect("inside a render pass");
                cx.spawn_pending(async move {
                    tokio::task::yield_now().await;
                    status.set("ready".to_string()).unwrap();
                });
                Ok(View::Node(node))
            })
            .await
            .unwrap();
        assert_eq!(output.html, r#"<p data-hk="0">ready</p>"#);
        assert_eq!(output.payload.root_values.get(&0), Some(&serde_json::json!("ready")));
    }
}
