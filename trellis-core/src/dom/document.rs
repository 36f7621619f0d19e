//! Arena Document
//!
//! An in-memory DOM. Nodes live in a flat arena and are addressed by
//! [`NodeId`]; parent and child links are ids, so there are no reference
//! cycles to manage. Removed nodes stay in the arena, detached, and can be
//! re-inserted.
//!
//! # Locking
//!
//! A [`Document`] is a cheap handle over `Arc<Mutex<Arena>>`. Every method
//! locks for the duration of one operation and never calls user code while
//! holding the lock, so bindings can freely touch the DOM from observers.
//!
//! # Statistics
//!
//! [`DomStats`] counts structural operations. Tests use it to assert how
//! many `insert_before` moves a reconciliation performed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as Json;

use super::html;
use super::node::{ElementData, NodeData, NodeId, NodeSlot};
use super::selector::Selector;
use crate::error::{Error, Result};

/// Counters for structural DOM operations.
#[derive(Debug, Default)]
pub struct DomStats {
    inserts: AtomicUsize,
    removals: AtomicUsize,
    created: AtomicUsize,
}

impl DomStats {
    /// Number of `insert_before`/`append_child` calls that changed the tree.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of `remove` calls that detached a node.
    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    /// Number of nodes created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.inserts.store(0, Ordering::SeqCst);
        self.removals.store(0, Ordering::SeqCst);
        self.created.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub(crate) struct Arena {
    pub(crate) nodes: Vec<NodeSlot>,
}

impl Arena {
    pub(crate) fn slot(&self, id: NodeId) -> &NodeSlot {
        &self.nodes[id.0]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeSlot::new(data));
        id
    }

    pub(crate) fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.slot(id).data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.slot_mut(id).data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.slot(node).parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.slot(node).parent else {
            return false;
        };
        self.slot_mut(parent).children.retain(|&c| c != node);
        self.slot_mut(node).parent = None;
        true
    }

    pub(crate) fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        if !self.slot(parent).data.is_container() {
            return Err(Error::NotAContainer(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::HierarchyCycle { parent, child });
        }
        if let Some(reference) = reference {
            if self.slot(reference).parent != Some(parent) {
                return Err(Error::NotAChild { parent, node: reference });
            }
        }

        self.detach(child);
        let children = &mut self.slot_mut(parent).children;
        let position = reference
            .and_then(|r| children.iter().position(|&c| c == r))
            .unwrap_or(children.len());
        children.insert(position, child);
        self.slot_mut(child).parent = Some(parent);
        Ok(())
    }

    pub(crate) fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.slot(node).parent?;
        let siblings = &self.slot(parent).children;
        let position = siblings.iter().position(|&c| c == node)?;
        siblings.get(position + 1).copied()
    }

    pub(crate) fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.slot(node).parent?;
        let siblings = &self.slot(parent).children;
        let position = siblings.iter().position(|&c| c == node)?;
        position.checked_sub(1).map(|p| siblings[p])
    }

    /// Preorder descendants, excluding `node` itself.
    pub(crate) fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.slot(node).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.slot(id).children.iter().rev().copied());
        }
        out
    }

    pub(crate) fn text_content(&self, node: NodeId) -> String {
        match &self.slot(node).data {
            NodeData::Text(t) => t.clone(),
            NodeData::Comment(_) => String::new(),
            _ => self
                .descendants(node)
                .into_iter()
                .filter_map(|id| match &self.slot(id).data {
                    NodeData::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    fn set_text_content(&mut self, node: NodeId, text: String) {
        if let &[only] = &self.slot(node).children[..] {
            if let NodeData::Text(existing) = &mut self.slot_mut(only).data {
                if !text.is_empty() {
                    *existing = text;
                    return;
                }
            }
        }
        for child in self.slot(node).children.clone() {
            self.detach(child);
        }
        if !text.is_empty() {
            let text_node = self.push(NodeData::Text(text));
            self.slot_mut(text_node).parent = Some(node);
            self.slot_mut(node).children.push(text_node);
        }
    }
}

/// Handle to an arena-backed document.
#[derive(Debug, Clone)]
pub struct Document {
    arena: Arc<Mutex<Arena>>,
    stats: Arc<DomStats>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        let mut arena = Arena { nodes: Vec::new() };
        let root = arena.push(NodeData::Document);
        Self {
            arena: Arc::new(Mutex::new(arena)),
            stats: Arc::new(DomStats::default()),
            root,
        }
    }

    /// Create a document whose root holds the parsed markup.
    pub fn from_html(markup: &str) -> Result<Self> {
        let document = Self::new();
        document.parse_into(document.root(), markup)?;
        Ok(document)
    }

    /// Parse `markup` and append the resulting nodes to `parent`.
    pub fn parse_into(&self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>> {
        let mut arena = self.arena.lock();
        let before = arena.nodes.len();
        let top = html::parse(&mut arena, markup)?;
        for &node in &top {
            arena.insert_before(parent, node, None)?;
        }
        self.stats
            .created
            .fetch_add(arena.nodes.len() - before, Ordering::SeqCst);
        Ok(top)
    }

    /// The document root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether two handles share one arena.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena)
    }

    /// Structural operation counters.
    pub fn stats(&self) -> &DomStats {
        &self.stats
    }

    fn create(&self, data: NodeData) -> NodeId {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        self.arena.lock().push(data)
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.create(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: impl Into<String>) -> NodeId {
        self.create(NodeData::Text(text.into()))
    }

    /// Create a detached comment node.
    pub fn create_comment(&self, text: impl Into<String>) -> NodeId {
        self.create(NodeData::Comment(text.into()))
    }

    /// Create an off-document holder for detached ranges.
    pub(crate) fn create_holder(&self) -> NodeId {
        self.create(NodeData::Holder)
    }

    /// Insert `child` under `parent` before `reference` (append if `None`),
    /// moving it from wherever it was.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        if reference == Some(child) {
            return Ok(());
        }
        self.arena.lock().insert_before(parent, child, reference)?;
        self.stats.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Detach `node` from its parent. Returns whether it was attached.
    pub fn remove(&self, node: NodeId) -> bool {
        let removed = self.arena.lock().detach(node);
        if removed {
            self.stats.removals.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Get a copy of a node's data.
    pub fn data(&self, node: NodeId) -> NodeData {
        self.arena.lock().slot(node).data.clone()
    }

    /// Get the node's parent.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.lock().slot(node).parent
    }

    /// Get the node's children.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena.lock().slot(node).children.clone()
    }

    /// Get the node's first child.
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.arena.lock().slot(node).children.first().copied()
    }

    /// Get the node's next sibling.
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.lock().next_sibling(node)
    }

    /// Get the node's previous sibling.
    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.lock().previous_sibling(node)
    }

    /// Whether `node` is `ancestor` or inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.arena.lock().is_ancestor_or_self(ancestor, node)
    }

    /// Whether `node` is attached under the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Get the element's tag, if it is an element.
    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.arena.lock().element(node).map(|el| el.tag.clone())
    }

    /// Get a comment node's text.
    pub fn comment_text(&self, node: NodeId) -> Option<String> {
        match &self.arena.lock().slot(node).data {
            NodeData::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Set an attribute. No-op on non-elements.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) {
        if let Some(el) = self.arena.lock().element_mut(node) {
            el.attributes.insert(name.to_string(), value.into());
        }
    }

    /// Get an attribute.
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.arena
            .lock()
            .element(node)
            .and_then(|el| el.attributes.get(name).cloned())
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(el) = self.arena.lock().element_mut(node) {
            el.attributes.shift_remove(name);
        }
    }

    /// Write a property.
    ///
    /// `textContent` replaces the element's children with one text node.
    /// Everything else is stored and reflected into markup on serialize.
    pub fn set_property(&self, node: NodeId, name: &str, value: Json) {
        let mut arena = self.arena.lock();
        if name == "textContent" {
            let text = match value {
                Json::String(s) => s,
                Json::Null => String::new(),
                other => other.to_string(),
            };
            arena.set_text_content(node, text);
            return;
        }
        if let Some(el) = arena.element_mut(node) {
            el.properties.insert(name.to_string(), value);
        }
    }

    /// Read a property. `textContent` is computed from descendants.
    pub fn property(&self, node: NodeId, name: &str) -> Option<Json> {
        let arena = self.arena.lock();
        if name == "textContent" {
            return Some(Json::String(arena.text_content(node)));
        }
        arena
            .element(node)
            .and_then(|el| el.properties.get(name).cloned())
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        self.arena.lock().text_content(node)
    }

    /// Preorder descendants of `node`, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.arena.lock().descendants(node)
    }

    /// First descendant of `root` matching `selector`.
    pub fn query_selector(&self, root: NodeId, selector: &str) -> Option<NodeId> {
        self.query_selector_all(root, selector).into_iter().next()
    }

    /// Every descendant of `root` matching `selector`, in document order.
    pub fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let arena = self.arena.lock();
        arena
            .descendants(root)
            .into_iter()
            .filter(|&id| selector.matches(&arena, id))
            .collect()
    }

    /// Search each of `nodes` and their descendants for `selector`.
    pub fn query_selector_in(&self, nodes: &[NodeId], selector: &str) -> Option<NodeId> {
        let selector = Selector::parse(selector)?;
        let arena = self.arena.lock();
        nodes.iter().find_map(|&node| {
            std::iter::once(node)
                .chain(arena.descendants(node))
                .find(|&id| selector.matches(&arena, id))
        })
    }

    /// Descendant element of `root` whose `id` attribute equals `id`.
    pub fn get_element_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        self.find_by_attribute(root, "id", id)
    }

    /// First descendant element of `root` with `name="value"`.
    pub fn find_by_attribute(&self, root: NodeId, name: &str, value: &str) -> Option<NodeId> {
        let arena = self.arena.lock();
        arena.descendants(root).into_iter().find(|&id| {
            arena
                .element(id)
                .and_then(|el| el.attributes.get(name))
                .is_some_and(|v| v == value)
        })
    }

    /// First of `nodes` or their descendants with `name="value"`.
    pub fn find_by_attribute_in(&self, nodes: &[NodeId], name: &str, value: &str) -> Option<NodeId> {
        let arena = self.arena.lock();
        nodes.iter().find_map(|&node| {
            std::iter::once(node).chain(arena.descendants(node)).find(|&id| {
                arena
                    .element(id)
                    .and_then(|el| el.attributes.get(name))
                    .is_some_and(|v| v == value)
            })
        })
    }

    /// First descendant comment of `root` whose text equals `text`.
    pub fn find_comment(&self, root: NodeId, text: &str) -> Option<NodeId> {
        let arena = self.arena.lock();
        arena.descendants(root).into_iter().find(|&id| {
            matches!(&arena.slot(id).data, NodeData::Comment(c) if c == text)
        })
    }

    /// Serialize a node and its subtree.
    pub fn to_html(&self, node: NodeId) -> String {
        let arena = self.arena.lock();
        let mut out = String::new();
        html::serialize(&arena, node, &mut out);
        out
    }

    /// Serialize a node's children.
    pub fn inner_html(&self, node: NodeId) -> String {
        let arena = self.arena.lock();
        let mut out = String::new();
        for &child in &arena.slot(node).children {
            html::serialize(&arena, child, &mut out);
        }
        out
    }
}
