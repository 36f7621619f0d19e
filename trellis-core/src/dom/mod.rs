//! In-Memory DOM
//!
//! This module holds everything that touches nodes:
//!
//! - [`Document`]: an arena-backed tree with attribute and property maps,
//!   selector queries, and HTML serialization/parsing for the markup this
//!   crate emits.
//! - [`Fragment`]: a marker-bounded range of siblings that can be moved,
//!   cleared and queried as a unit.
//! - [`ElementBuilder`]: the element-creation layer that turns observables
//!   into property bindings and requests stable element ids.
//! - [`KeyedList`]: minimal-move reconciliation of an observable array.

mod document;
mod element;
mod fragment;
mod html;
mod keyed;
mod node;
mod selector;

pub use document::{Document, DomStats};
pub use element::ElementBuilder;
pub use fragment::{Fragment, View};
pub use html::{decode_entities, escape_attribute, escape_text};
pub use keyed::KeyedList;
pub use node::{ElementData, NodeData, NodeId};
