//! DOM node types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Index of a node in its [`Document`](super::Document) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Get the raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Element payload: tag, attributes and properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementData {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in insertion order.
    pub attributes: IndexMap<String, String>,
    /// Properties written by bindings, reflected into markup on serialize.
    pub properties: IndexMap<String, Json>,
}

impl ElementData {
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// The document root.
    Document,
    /// An element.
    Element(ElementData),
    /// A text node.
    Text(String),
    /// A comment node. Fragment boundary markers are comments.
    Comment(String),
    /// An off-document container holding detached fragment ranges.
    Holder,
}

impl NodeData {
    /// Whether this node can have children.
    pub fn is_container(&self) -> bool {
        matches!(self, NodeData::Document | NodeData::Element(_) | NodeData::Holder)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeSlot {
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeSlot {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
        }
    }
}
