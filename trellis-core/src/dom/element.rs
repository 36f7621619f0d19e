//! Element Builder
//!
//! The element-creation layer. Every property passed a live observable
//! becomes a binding through [`Observable::bind`], and the builder asks the
//! active render context for a stable element id whenever it creates one.
//! Elements with only static properties get no id.
//!
//! During a hydration pass an element with an id adopts the server node
//! carrying that id, has its transmitted roots reconciled, and only then
//! binds, so the first bound value is already the hydrated one.

use std::sync::Arc;

use serde_json::Value as Json;

use super::document::Document;
use super::fragment::View;
use super::node::NodeId;
use crate::error::{Error, Result};
use crate::hydration::{RenderContext, RenderMode};
use crate::reactive::{AnyObservable, Cleanup, Observable, Owner, ReactiveValue, Runtime, Value};

type Binder = Box<dyn FnOnce(&Document, NodeId) -> Cleanup + Send>;

enum PropValue {
    Static(Json),
    Dynamic {
        observable: Arc<dyn AnyObservable>,
        bind: Binder,
    },
}

struct Prop {
    name: String,
    value: PropValue,
}

/// Builds one element with attributes, properties and children.
///
/// # Example
///
/// ```rust
/// use trellis_core::dom::{Document, ElementBuilder};
/// use trellis_core::reactive::{Observable, Scheduler};
///
/// let doc = Document::new();
/// let label = Observable::new("Save".to_string());
/// let button = ElementBuilder::new("button")
///     .attr("type", "submit")
///     .text(&label)
///     .build(&doc)
///     .unwrap();
///
/// label.set("Saved".to_string()).unwrap();
/// Scheduler::flush_sync();
/// assert_eq!(doc.text_content(button), "Saved");
/// ```
pub struct ElementBuilder {
    tag: String,
    attributes: Vec<(String, String)>,
    props: Vec<Prop>,
    children: Vec<View>,
    error: Option<Error>,
}

impl ElementBuilder {
    /// Start an element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            props: Vec::new(),
            children: Vec::new(),
            error: None,
        }
    }

    /// Set a static attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Set a property, static or bound to an observable.
    pub fn prop<T: Value>(mut self, name: impl Into<String>, value: impl Into<ReactiveValue<T>>) -> Self {
        let name = name.into();
        let value = match value.into() {
            ReactiveValue::Static(v) => match serde_json::to_value(&v) {
                Ok(json) => PropValue::Static(json),
                Err(err) => {
                    self.error.get_or_insert(Error::Json(err));
                    return self;
                }
            },
            ReactiveValue::Dynamic(observable) => PropValue::Dynamic {
                observable: observable.erased(),
                bind: binder(name.clone(), observable),
            },
        };
        self.props.push(Prop { name, value });
        self
    }

    /// Set the text content.
    pub fn text(self, value: impl Into<ReactiveValue<String>>) -> Self {
        self.prop("textContent", value)
    }

    /// Append a child node or fragment.
    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children.
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Create (or, while hydrating, adopt) the element and bind its
    /// properties.
    pub fn build(self, document: &Document) -> Result<NodeId> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let cx = RenderContext::current();
        let dynamic = self
            .props
            .iter()
            .any(|p| matches!(p.value, PropValue::Dynamic { .. }));
        let element_id = match (&cx, dynamic) {
            (Some(cx), true) => Some(cx.next_id().to_string()),
            _ => None,
        };

        let adopted = match (&cx, &element_id) {
            (Some(cx), Some(id)) if cx.is_hydrating() => cx.adopt_element(document, id),
            _ => None,
        };

        let node = match adopted {
            Some(node) => node,
            None => {
                let node = document.create_element(&self.tag);
                for (name, value) in &self.attributes {
                    document.set_attribute(node, name, value.as_str());
                }
                let hydrating = cx.as_ref().is_some_and(RenderContext::is_hydrating);
                for child in &self.children {
                    // Adopted descendants stay where the server put them.
                    if hydrating && document.is_connected(child.first_node()) {
                        continue;
                    }
                    child.insert(document, node, None)?;
                }
                node
            }
        };

        if let (Some(cx), Some(id)) = (&cx, &element_id) {
            match cx.mode() {
                RenderMode::Server => {
                    document.set_attribute(node, &cx.config().element_id_attribute, id.as_str());
                }
                RenderMode::Hydrate if adopted.is_some() => cx.hydrate_element(id),
                _ => {}
            }
        }

        for prop in self.props {
            match prop.value {
                PropValue::Static(json) => document.set_property(node, &prop.name, json),
                PropValue::Dynamic { observable, bind } => {
                    if let (Some(cx), Some(id)) = (&cx, &element_id) {
                        if cx.mode() == RenderMode::Server {
                            cx.record_binding(id, &prop.name, observable);
                        }
                    }
                    Owner::track_cleanup(bind(document, node));
                }
            }
        }

        Ok(node)
    }
}

fn binder<T: Value>(name: String, observable: Observable<T>) -> Binder {
    Box::new(move |document: &Document, node: NodeId| {
        let document = document.clone();
        observable.bind(node, move |value: &T, &node: &NodeId| {
            match serde_json::to_value(value) {
                Ok(json) => document.set_property(node, &name, json),
                Err(err) => Runtime::report(&Error::Json(err)),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Scheduler;
    use serde_json::json;

    #[test]
    fn static_element_gets_no_binding() {
        let doc = Document::new();
        let text = doc.create_text("hi");
        let node = ElementBuilder::new("p")
            .attr("class", "note")
            .prop("hidden", false)
            .child(text)
            .build(&doc)
            .unwrap();
        assert_eq!(doc.to_html(node), r#"<p class="note">hi</p>"#);
    }

    #[test]
    fn dynamic_property_follows_observable() {
        let doc = Document::new();
        let disabled = Observable::new(false);
        let node = ElementBuilder::new("button")
            .prop("disabled", &disabled)
            .text("Go")
            .build(&doc)
            .unwrap();
        assert_eq!(doc.property(node, "disabled"), Some(json!(false)));
        assert_eq!(disabled.observer_count(), 1);

        disabled.set(true).unwrap();
        Scheduler::flush_sync();
        assert_eq!(doc.to_html(node), "<button disabled>Go</button>");
    }

    #[test]
    fn owner_releases_bindings() {
        let doc = Document::new();
        let label = Observable::new("a".to_string());
        let owner = Owner::detached();
        owner.run(|| ElementBuilder::new("span").text(&label).build(&doc).unwrap());
        assert_eq!(label.observer_count(), 1);

        owner.dispose();
        assert_eq!(label.observer_count(), 0);
    }
}
