//! Fragments
//!
//! A [`Fragment`] is a contiguous run of sibling nodes delimited by two
//! comment markers, `s:<id>` and `e:<id>`. It lets a dynamic range be moved,
//! cleared and queried without a wrapping element.
//!
//! # How Fragments Work
//!
//! 1. Every fragment owns an off-document holder node. An unattached
//!    fragment keeps its markers (and whatever was inserted between them) in
//!    the holder, so every operation works the same whether or not the
//!    fragment is in the document.
//!
//! 2. [`Fragment::append_to`] moves the whole range into a real parent;
//!    [`Fragment::remove`] moves it back into the holder, keeping it
//!    addressable for a later re-mount.
//!
//! 3. [`Fragment::nodes`] walks the live siblings between the markers on
//!    every call. Nothing is cached, so external mutation of the interior is
//!    always reflected.
//!
//! 4. Fragments nest: inserting a fragment into another places its marker
//!    pair between the outer markers.
//!
//! # Marker Elision
//!
//! A fragment adopted during hydration can drop its markers from the DOM
//! (see [`RuntimeConfig::elide_markers`]). It then remembers its parent, its
//! nodes and the node that followed its end marker. Any structural
//! operation first puts the markers back at the remembered position.
//! External mutation between elision and that restore is not tracked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::document::Document;
use super::node::NodeId;
use crate::config::RuntimeConfig;
use crate::error::{Error, HydrationError, Result};
use crate::hydration::RenderContext;

/// Ids for fragments created outside any render context.
static FRAGMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1 << 32);

/// A node or a fragment: anything that can be placed as a unit.
#[derive(Debug, Clone)]
pub enum View {
    /// A single node.
    Node(NodeId),
    /// A marker-bounded range.
    Fragment(Fragment),
}

impl View {
    /// Insert before `anchor` in `parent` (append if `None`).
    pub fn insert(&self, document: &Document, parent: NodeId, anchor: Option<NodeId>) -> Result<()> {
        match self {
            View::Node(node) => document.insert_before(parent, *node, anchor),
            View::Fragment(fragment) => fragment.append_to(parent, anchor),
        }
    }

    /// Detach from the document.
    pub fn remove(&self, document: &Document) {
        match self {
            View::Node(node) => {
                document.remove(*node);
            }
            View::Fragment(fragment) => fragment.remove(),
        }
    }

    /// First top-level node, markers included.
    pub fn first_node(&self) -> NodeId {
        match self {
            View::Node(node) => *node,
            View::Fragment(fragment) => fragment.outer_nodes()[0],
        }
    }

    /// Last top-level node, markers included.
    pub fn last_node(&self) -> NodeId {
        match self {
            View::Node(node) => *node,
            View::Fragment(fragment) => {
                let outer = fragment.outer_nodes();
                outer[outer.len() - 1]
            }
        }
    }

    /// Every top-level node this view occupies, markers included.
    pub fn top_level_nodes(&self) -> Vec<NodeId> {
        match self {
            View::Node(node) => vec![*node],
            View::Fragment(fragment) => fragment.outer_nodes(),
        }
    }
}

impl From<NodeId> for View {
    fn from(node: NodeId) -> Self {
        View::Node(node)
    }
}

impl From<Fragment> for View {
    fn from(fragment: Fragment) -> Self {
        View::Fragment(fragment)
    }
}

impl From<&Fragment> for View {
    fn from(fragment: &Fragment) -> Self {
        View::Fragment(fragment.clone())
    }
}

#[derive(Debug, Clone)]
enum Markers {
    Live {
        start: NodeId,
        end: NodeId,
    },
    Elided {
        start: NodeId,
        end: NodeId,
        parent: NodeId,
        nodes: Vec<NodeId>,
        after: Option<NodeId>,
    },
}

#[derive(Debug)]
struct FragmentInner {
    id: u64,
    document: Document,
    holder: NodeId,
    markers: Mutex<Markers>,
}

/// Handle to a marker-bounded range of sibling nodes.
#[derive(Debug, Clone)]
pub struct Fragment {
    inner: Arc<FragmentInner>,
}

impl Fragment {
    /// Create a fragment.
    ///
    /// Inside a hydration pass this adopts the server's markers for the next
    /// context id, falling back to fresh markers (and reporting the
    /// mismatch) when they are missing. Elsewhere it creates unattached
    /// markers.
    pub fn new(document: &Document) -> Self {
        let Some(cx) = RenderContext::current() else {
            let id = FRAGMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            return Self::fresh(document, id, &RuntimeConfig::default());
        };

        let id = cx.next_id();
        if let Some(root) = cx.hydration_root().filter(|_| cx.is_hydrating()) {
            match Self::adopt(document, root, id, cx.config()) {
                Ok(fragment) => {
                    if cx.config().elide_markers {
                        fragment.elide();
                    }
                    return fragment;
                }
                Err(mismatch) => cx.report_mismatch(mismatch),
            }
        }
        Self::fresh(document, id, cx.config())
    }

    /// Create an unattached fragment with fresh markers.
    pub fn fresh(document: &Document, id: u64, config: &RuntimeConfig) -> Self {
        let holder = document.create_holder();
        let start = document.create_comment(config.start_marker(id));
        let end = document.create_comment(config.end_marker(id));
        // Holders always accept children and the markers are new.
        let _ = document.append_child(holder, start);
        let _ = document.append_child(holder, end);
        Self::with_markers(document, id, holder, start, end)
    }

    /// Wrap existing markers. They must share a parent.
    pub fn from_markers(document: &Document, id: u64, start: NodeId, end: NodeId) -> Result<Self> {
        let parent = document.parent(start);
        if parent.is_none() || parent != document.parent(end) {
            return Err(Error::MarkerParentMismatch { start, end });
        }
        let holder = document.create_holder();
        Ok(Self::with_markers(document, id, holder, start, end))
    }

    /// Find the markers for `id` under `root` and wrap them.
    pub fn adopt(
        document: &Document,
        root: NodeId,
        id: u64,
        config: &RuntimeConfig,
    ) -> std::result::Result<Self, HydrationError> {
        let start = document.find_comment(root, &config.start_marker(id));
        let end = document.find_comment(root, &config.end_marker(id));
        match (start, end) {
            (Some(start), Some(end)) => Self::from_markers(document, id, start, end)
                .map_err(|_| HydrationError::MissingMarkers(id)),
            _ => Err(HydrationError::MissingMarkers(id)),
        }
    }

    fn with_markers(document: &Document, id: u64, holder: NodeId, start: NodeId, end: NodeId) -> Self {
        Self {
            inner: Arc::new(FragmentInner {
                id,
                document: document.clone(),
                holder,
                markers: Mutex::new(Markers::Live { start, end }),
            }),
        }
    }

    /// The fragment id encoded in its markers.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The document this fragment lives in.
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// The live `(start, end)` markers, or `None` while elided.
    pub fn markers(&self) -> Option<(NodeId, NodeId)> {
        match &*self.inner.markers.lock() {
            Markers::Live { start, end } => Some((*start, *end)),
            Markers::Elided { .. } => None,
        }
    }

    /// The parent currently holding the range, if it is in a real parent.
    pub fn parent(&self) -> Option<NodeId> {
        match &*self.inner.markers.lock() {
            Markers::Live { start, .. } => self
                .inner
                .document
                .parent(*start)
                .filter(|&p| p != self.inner.holder),
            Markers::Elided { parent, .. } => Some(*parent),
        }
    }

    /// Whether the range sits in a real parent rather than its holder.
    pub fn is_attached(&self) -> bool {
        self.parent().is_some()
    }

    /// Whether the markers are currently elided.
    pub fn is_elided(&self) -> bool {
        matches!(&*self.inner.markers.lock(), Markers::Elided { .. })
    }

    /// Top-level nodes strictly between the markers, read live.
    pub fn nodes(&self) -> Vec<NodeId> {
        let markers = self.inner.markers.lock().clone();
        match markers {
            Markers::Live { start, end } => self.between(start, end),
            Markers::Elided { nodes, .. } => nodes,
        }
    }

    fn between(&self, start: NodeId, end: NodeId) -> Vec<NodeId> {
        let document = &self.inner.document;
        let mut nodes = Vec::new();
        let mut cursor = document.next_sibling(start);
        while let Some(node) = cursor {
            if node == end {
                break;
            }
            nodes.push(node);
            cursor = document.next_sibling(node);
        }
        nodes
    }

    /// Markers plus interior, in order.
    fn outer_nodes(&self) -> Vec<NodeId> {
        let markers = self.inner.markers.lock().clone();
        match markers {
            Markers::Live { start, end } => {
                let mut nodes = vec![start];
                nodes.extend(self.between(start, end));
                nodes.push(end);
                nodes
            }
            Markers::Elided { start, end, nodes, .. } if nodes.is_empty() => vec![start, end],
            Markers::Elided { nodes, .. } => nodes,
        }
    }

    /// Drop the markers from the DOM, remembering the range in memory.
    ///
    /// Returns `false` if the fragment is unattached or already elided.
    pub fn elide(&self) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        let mut markers = self.inner.markers.lock();
        let Markers::Live { start, end } = *markers else {
            return false;
        };
        let document = &self.inner.document;
        let nodes = self.between(start, end);
        let after = document.next_sibling(end);
        document.remove(start);
        document.remove(end);
        *markers = Markers::Elided {
            start,
            end,
            parent,
            nodes,
            after,
        };
        tracing::trace!(fragment = self.inner.id, "fragment markers elided");
        true
    }

    /// Put elided markers back and return the live pair.
    fn ensure_live(&self) -> Result<(NodeId, NodeId)> {
        let mut markers = self.inner.markers.lock();
        let (start, end, parent, nodes, after) = match &*markers {
            Markers::Live { start, end } => return Ok((*start, *end)),
            Markers::Elided {
                start,
                end,
                parent,
                nodes,
                after,
            } => (*start, *end, *parent, nodes.clone(), *after),
        };

        let document = &self.inner.document;
        let in_place: Vec<NodeId> = nodes
            .into_iter()
            .filter(|&n| document.parent(n) == Some(parent))
            .collect();
        let after = after.filter(|&a| document.parent(a) == Some(parent));

        match (in_place.first(), in_place.last()) {
            (Some(&first), Some(&last)) => {
                let next = document.next_sibling(last);
                document.insert_before(parent, start, Some(first))?;
                document.insert_before(parent, end, next)?;
            }
            _ => {
                document.insert_before(parent, start, after)?;
                document.insert_before(parent, end, after)?;
            }
        }
        *markers = Markers::Live { start, end };
        tracing::trace!(fragment = self.inner.id, "fragment markers restored");
        Ok((start, end))
    }

    /// The live `(start, end)` markers, restoring them first if elided.
    pub fn live_markers(&self) -> Result<(NodeId, NodeId)> {
        self.ensure_live()
    }

    /// Move the whole range into `parent` before `anchor` (append if `None`).
    pub fn append_to(&self, parent: NodeId, anchor: Option<NodeId>) -> Result<()> {
        let (start, end) = self.ensure_live()?;
        let document = &self.inner.document;
        let mut range = vec![start];
        range.extend(self.between(start, end));
        range.push(end);
        for node in range {
            document.insert_before(parent, node, anchor)?;
        }
        Ok(())
    }

    /// Detach markers and interior, keeping them for a later
    /// [`Fragment::append_to`].
    pub fn remove(&self) {
        if !self.is_attached() {
            return;
        }
        // Re-attaching to our own holder cannot fail.
        let _ = self.append_to(self.inner.holder, None);
    }

    /// Delete every interior node, keeping the markers in place.
    pub fn clear(&self) {
        let nodes = match self.ensure_live() {
            Ok((start, end)) => self.between(start, end),
            Err(_) => self.nodes(),
        };
        for node in nodes {
            self.inner.document.remove(node);
        }
    }

    /// Insert a child at the end of the range.
    pub fn append_child(&self, child: impl Into<View>) -> Result<()> {
        let (start, end) = self.ensure_live()?;
        let parent = self.marker_parent(start)?;
        child.into().insert(&self.inner.document, parent, Some(end))
    }

    /// Insert a child before `reference`, which must be a top-level node of
    /// this fragment.
    pub fn insert_before(&self, child: impl Into<View>, reference: NodeId) -> Result<()> {
        let (start, end) = self.ensure_live()?;
        if !self.between(start, end).contains(&reference) {
            return Err(Error::NotInFragment {
                node: reference,
                fragment: self.inner.id,
            });
        }
        let parent = self.marker_parent(start)?;
        child.into().insert(&self.inner.document, parent, Some(reference))
    }

    /// Insert children at the start of the range, keeping their order.
    pub fn prepend<I>(&self, children: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        let (start, end) = self.ensure_live()?;
        let parent = self.marker_parent(start)?;
        let anchor = self.inner.document.next_sibling(start).unwrap_or(end);
        for child in children {
            child.into().insert(&self.inner.document, parent, Some(anchor))?;
        }
        Ok(())
    }

    /// Insert children at the end of the range.
    pub fn append<I>(&self, children: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        for child in children {
            self.append_child(child)?;
        }
        Ok(())
    }

    /// Replace the interior with `children`.
    pub fn replace_children<I>(&self, children: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        self.clear();
        self.append(children)
    }

    fn marker_parent(&self, start: NodeId) -> Result<NodeId> {
        self.inner
            .document
            .parent(start)
            .ok_or(Error::NotInFragment {
                node: start,
                fragment: self.inner.id,
            })
    }

    /// First element in the range matching `selector`.
    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.inner.document.query_selector_in(&self.nodes(), selector)
    }

    /// Element in the range whose `id` attribute equals `id`.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.inner.document.find_by_attribute_in(&self.nodes(), "id", id)
    }

    /// Concatenated text of the interior.
    pub fn text_content(&self) -> String {
        self.nodes()
            .into_iter()
            .map(|n| self.inner.document.text_content(n))
            .collect()
    }

    /// Serialize the range. Elided markers are not emitted.
    pub fn to_html(&self) -> String {
        let nodes = if self.is_elided() {
            self.nodes()
        } else {
            self.outer_nodes()
        };
        nodes
            .into_iter()
            .map(|n| self.inner.document.to_html(n))
            .collect()
    }

    /// Whether two handles refer to the same fragment.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
