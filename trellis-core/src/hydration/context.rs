//! Render Context
//!
//! Per-pass state shared by everything that runs inside one render or
//! hydration pass.
//!
//! # How It Works
//!
//! A [`RenderContext`] is opened for one pass, made current with
//! [`RenderContext::enter`] (or [`RenderContext::scope`] for futures), and
//! closed afterwards. While it is current:
//!
//! - every observable constructed is appended to its registry, so the
//!   registry order is the creation order;
//! - [`RenderContext::next_id`] hands out element and fragment ids from one
//!   counter, so a server pass and the matching client pass agree on them;
//! - on the server, bindings are recorded per element id and turned into a
//!   [`HydrationPayload`] at the end of the pass;
//! - on the client, roots take their transmitted value as they are
//!   registered, and elements with an id adopt their server node.
//!
//! The current context is a tokio task-local, not a global, so concurrent
//! requests on one runtime never see each other's ids or registries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::payload::{ElementBinding, HydrationPayload};
use super::reconcile::{hydrate_registered_root, reconcile_element, HydrationReport};
use crate::config::RuntimeConfig;
use crate::dom::{Document, NodeId};
use crate::error::{Error, HydrationError, Result};
use crate::graph::{build_graph, find_paths_to_roots};
use crate::reactive::AnyObservable;

tokio::task_local! {
    static CURRENT: RenderContext;
}

/// Counter for render pass ids.
static PASS_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// What kind of pass a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Producing HTML and a payload. Notification is synchronous.
    Server,
    /// Re-attaching to server markup.
    Hydrate,
    /// Plain client rendering with deterministic ids.
    Client,
}

struct RecordedBinding {
    element_id: String,
    property: String,
    observable: Arc<dyn AnyObservable>,
}

struct HydrationState {
    document: Document,
    root: NodeId,
    payload: HydrationPayload,
    report: Mutex<HydrationReport>,
}

#[derive(Default)]
struct Registry {
    observables: Vec<Arc<dyn AnyObservable>>,
    index: HashMap<u64, usize>,
}

struct ContextInner {
    pass_id: u64,
    mode: RenderMode,
    config: RuntimeConfig,
    next_id: AtomicU64,
    registry: Mutex<Registry>,
    bindings: Mutex<Vec<RecordedBinding>>,
    pending: Mutex<Vec<BoxFuture<'static, ()>>>,
    hydration: Option<HydrationState>,
    closed: AtomicBool,
}

/// Handle to one render or hydration pass.
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

impl RenderContext {
    fn open(mode: RenderMode, config: RuntimeConfig, hydration: Option<HydrationState>) -> Self {
        let pass_id = PASS_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(pass_id, ?mode, "render context opened");
        Self {
            inner: Arc::new(ContextInner {
                pass_id,
                mode,
                config,
                next_id: AtomicU64::new(0),
                registry: Mutex::new(Registry::default()),
                bindings: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                hydration,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Open a server pass.
    pub fn server(config: RuntimeConfig) -> Self {
        Self::open(RenderMode::Server, config, None)
    }

    /// Open a plain client pass.
    pub fn client(config: RuntimeConfig) -> Self {
        Self::open(RenderMode::Client, config, None)
    }

    /// Open a hydration pass over server markup under `root`.
    pub fn hydrating(
        config: RuntimeConfig,
        document: &Document,
        root: NodeId,
        payload: HydrationPayload,
    ) -> Self {
        let hydration = HydrationState {
            document: document.clone(),
            root,
            payload,
            report: Mutex::new(HydrationReport::default()),
        };
        Self::open(RenderMode::Hydrate, config, Some(hydration))
    }

    /// The context of the current pass, if any.
    pub fn current() -> Option<RenderContext> {
        CURRENT.try_with(|cx| cx.clone()).ok()
    }

    /// Run `f` with this context current.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self.clone(), f)
    }

    /// Drive `future` with this context current.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.clone(), future).await
    }

    /// Unique id of this pass.
    pub fn pass_id(&self) -> u64 {
        self.inner.pass_id
    }

    /// The kind of pass.
    pub fn mode(&self) -> RenderMode {
        self.inner.mode
    }

    /// Configuration for this pass.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether this is a hydration pass.
    pub fn is_hydrating(&self) -> bool {
        self.inner.mode == RenderMode::Hydrate
    }

    /// Whether observables created in this pass notify inline.
    pub fn notifies_synchronously(&self) -> bool {
        self.inner.mode == RenderMode::Server || self.inner.config.sync_updates
    }

    /// Whether [`RenderContext::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Next element or fragment id.
    pub fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Append an observable to the registry. Called on construction.
    ///
    /// In a hydration pass a root with a transmitted value takes it here,
    /// before anything can read the client default. This covers roots no
    /// element binding reaches, such as a keyed list's items.
    pub(crate) fn register_observable(&self, observable: Arc<dyn AnyObservable>) {
        if self.is_closed() {
            tracing::warn!(pass_id = self.inner.pass_id, "observable created after its render pass closed");
            return;
        }
        let index = {
            let mut registry = self.inner.registry.lock();
            let index = registry.observables.len();
            registry.index.insert(observable.id(), index);
            registry.observables.push(Arc::clone(&observable));
            index
        };

        if let Some(hydration) = &self.inner.hydration {
            if !observable.is_derived() {
                let mut report = hydration.report.lock();
                hydrate_registered_root(&hydration.payload, &observable, index, &mut report);
            }
        }
    }

    /// Number of observables registered so far.
    pub fn registered(&self) -> usize {
        self.inner.registry.lock().observables.len()
    }

    /// Registration index of an observable.
    pub fn index_of(&self, observable: &dyn AnyObservable) -> Option<usize> {
        self.inner.registry.lock().index.get(&observable.id()).copied()
    }

    /// Record that `observable` drives `property` of element `element_id`.
    pub fn record_binding(&self, element_id: &str, property: &str, observable: Arc<dyn AnyObservable>) {
        self.inner.bindings.lock().push(RecordedBinding {
            element_id: element_id.to_string(),
            property: property.to_string(),
            observable,
        });
    }

    /// Register work the pass must wait for before serializing.
    pub fn spawn_pending<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.pending.lock().push(Box::pin(future));
    }

    pub(crate) fn take_pending(&self) -> Vec<BoxFuture<'static, ()>> {
        std::mem::take(&mut *self.inner.pending.lock())
    }

    /// Root under which server markup is adopted, in a hydration pass.
    pub fn hydration_root(&self) -> Option<NodeId> {
        self.inner.hydration.as_ref().map(|h| h.root)
    }

    /// Find the server node carrying `element_id`.
    ///
    /// A miss is reported and the caller creates a fresh node.
    pub fn adopt_element(&self, document: &Document, element_id: &str) -> Option<NodeId> {
        let hydration = self.inner.hydration.as_ref()?;
        if !document.ptr_eq(&hydration.document) {
            tracing::warn!(element_id, "element built against a different document than the one hydrating");
        }
        let node = document.find_by_attribute(
            hydration.root,
            &self.inner.config.element_id_attribute,
            element_id,
        );
        if node.is_none() {
            self.report_mismatch(HydrationError::MissingElement(element_id.to_string()));
        }
        node
    }

    /// Write the transmitted root values behind `element_id`'s bindings.
    pub fn hydrate_element(&self, element_id: &str) {
        let Some(hydration) = self.inner.hydration.as_ref() else {
            return;
        };
        let registry = self.inner.registry.lock().observables.clone();
        let mut report = hydration.report.lock();
        reconcile_element(&hydration.payload, &registry, element_id, &mut report);
    }

    /// Log a recoverable mismatch and add it to the pass report.
    pub fn report_mismatch(&self, mismatch: HydrationError) {
        tracing::warn!(pass_id = self.inner.pass_id, %mismatch, "hydration mismatch");
        if let Some(hydration) = &self.inner.hydration {
            hydration.report.lock().mismatches.push(mismatch);
        }
    }

    /// Snapshot of the hydration report so far.
    pub fn report(&self) -> HydrationReport {
        self.inner
            .hydration
            .as_ref()
            .map(|h| h.report.lock().clone())
            .unwrap_or_default()
    }

    /// Build the payload for everything registered in this pass.
    ///
    /// Fails if an observable's parent was created outside the pass.
    pub fn build_payload(&self) -> Result<HydrationPayload> {
        if self.is_closed() {
            return Err(Error::ContextClosed(self.inner.pass_id));
        }
        let registry = self.inner.registry.lock();
        let graph = build_graph(&registry.observables)?;

        let mut payload = HydrationPayload::default();
        for &root in &graph.root_ids {
            payload
                .root_values
                .insert(root, registry.observables[root].to_json()?);
        }

        for binding in self.inner.bindings.lock().iter() {
            let Some(&index) = registry.index.get(&binding.observable.id()) else {
                tracing::warn!(
                    element_id = %binding.element_id,
                    property = %binding.property,
                    "bound observable was created outside the render pass; binding not transmitted"
                );
                continue;
            };
            payload
                .bindings_by_element_id
                .entry(binding.element_id.clone())
                .or_default()
                .push(ElementBinding {
                    observable_numeric_id: index,
                    property: binding.property.clone(),
                    paths_to_roots: find_paths_to_roots(&graph, index),
                });
        }

        payload.graph = graph;
        Ok(payload)
    }

    /// End the pass.
    ///
    /// A server pass destroys everything it registered. Client passes keep
    /// their observables alive; only the registries are reset.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let registry = std::mem::take(&mut *self.inner.registry.lock());
        self.inner.bindings.lock().clear();
        self.inner.pending.lock().clear();

        if self.inner.mode == RenderMode::Server {
            for observable in registry.observables.iter().rev() {
                observable.destroy();
            }
        }
        tracing::debug!(
            pass_id = self.inner.pass_id,
            observables = registry.observables.len(),
            "render context closed"
        );
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("pass_id", &self.inner.pass_id)
            .field("mode", &self.inner.mode)
            .field("registered", &self.registered())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;

    #[test]
    fn registers_in_creation_order() {
        let cx = RenderContext::server(RuntimeConfig::default());
        let (a, label) = cx.enter(|| {
            let a = Observable::new(1);
            let label = a.derive(|n| format!("n={n}"));
            (a, label)
        });
        assert_eq!(cx.registered(), 2);
        assert_eq!(cx.index_of(&*a.erased()), Some(0));
        assert_eq!(cx.index_of(&*label.erased()), Some(1));
        assert!(a.is_sync());
        assert!(RenderContext::current().is_none());
    }

    #[test]
    fn ids_are_per_pass() {
        let first = RenderContext::server(RuntimeConfig::default());
        let second = RenderContext::server(RuntimeConfig::default());
        assert_eq!(first.next_id(), 0);
        assert_eq!(first.next_id(), 1);
        assert_eq!(second.next_id(), 0);
        assert_ne!(first.pass_id(), second.pass_id());
    }

    #[test]
    fn payload_lists_bindings_with_paths() {
        let cx = RenderContext::server(RuntimeConfig::default());
        let payload = cx
            .enter(|| {
                let count = Observable::new(3);
                let label = count.derive(|n| format!("Count: {n}"));
                cx.record_binding("0", "textContent", label.erased());
                cx.build_payload()
            })
            .unwrap();

        assert_eq!(payload.root_values.get(&0), Some(&serde_json::json!(3)));
        let bindings = payload.bindings("0").unwrap();
        assert_eq!(bindings[0].observable_numeric_id, 1);
        assert_eq!(bindings[0].paths_to_roots, vec![vec![0]]);
    }

    #[test]
    fn closing_a_server_pass_destroys_its_observables() {
        let cx = RenderContext::server(RuntimeConfig::default());
        let count = cx.enter(|| Observable::new(0));
        cx.close();
        assert!(count.is_destroyed());
        assert!(matches!(cx.build_payload(), Err(Error::ContextClosed(_))));

        let client = RenderContext::client(RuntimeConfig::default());
        let kept = client.enter(|| Observable::new(0));
        client.close();
        assert!(!kept.is_destroyed());
    }
}
