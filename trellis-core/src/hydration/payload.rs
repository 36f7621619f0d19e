//! Hydration Payload
//!
//! The data a server pass hands to the matching client pass: root values,
//! per-element bindings, and the dependency graph. Field names on the wire
//! are camelCase:
//!
//! ```json
//! {
//!   "rootValues": { "0": 42 },
//!   "bindingsByElementId": {
//!     "1": [{ "observableNumericId": 2, "property": "textContent", "pathsToRoots": [[0]] }]
//!   },
//!   "graph": { "nodes": [{ "id": 0, "parentIds": [] }], "rootIds": [0] }
//! }
//! ```
//!
//! JSON is what gets embedded in a page. MessagePack carries the same
//! structure when the payload travels out of band.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::config::RuntimeConfig;
use crate::dom::Document;
use crate::error::Result;
use crate::graph::DependencyGraph;

/// One reactive property of one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBinding {
    /// Registration index of the bound observable.
    pub observable_numeric_id: usize,

    /// Property the observable drives.
    pub property: String,

    /// Parent positions leading from the bound observable to each root.
    pub paths_to_roots: Vec<Vec<usize>>,
}

/// Everything the client needs to re-attach to server markup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationPayload {
    /// Serialized values of root observables, keyed by node id.
    pub root_values: BTreeMap<usize, Json>,

    /// Bindings keyed by stable element id.
    pub bindings_by_element_id: BTreeMap<String, Vec<ElementBinding>>,

    /// The pass's dependency graph.
    pub graph: DependencyGraph,
}

impl HydrationPayload {
    /// Bindings recorded for an element id.
    pub fn bindings(&self, element_id: &str) -> Option<&[ElementBinding]> {
        self.bindings_by_element_id
            .get(element_id)
            .map(Vec::as_slice)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as MessagePack with named fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode from MessagePack.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Render the `<script>` element that embeds this payload.
    ///
    /// `</` is written as `<\/` so the JSON cannot close the script early.
    pub fn to_script_tag(&self, config: &RuntimeConfig) -> Result<String> {
        let json = self.to_json()?.replace("</", "<\\/");
        Ok(format!(
            r#"<script type="application/json" id="{}">{}</script>"#,
            config.payload_script_id, json
        ))
    }

    /// Pull the embedded payload out of a server-rendered page.
    ///
    /// Returns `Ok(None)` when the page carries no payload script.
    pub fn extract(html: &str, config: &RuntimeConfig) -> Result<Option<Self>> {
        let document = Document::from_html(html)?;
        Self::extract_from(&document, config)
    }

    /// Like [`HydrationPayload::extract`], for an already parsed document.
    pub fn extract_from(document: &Document, config: &RuntimeConfig) -> Result<Option<Self>> {
        let Some(script) = document.get_element_by_id(document.root(), &config.payload_script_id)
        else {
            return Ok(None);
        };
        let json = document.text_content(script);
        Self::from_json(&json).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphNode;
    use serde_json::json;

    fn sample() -> HydrationPayload {
        let mut payload = HydrationPayload::default();
        payload.root_values.insert(0, json!("</script><b>"));
        payload.bindings_by_element_id.insert(
            "1".into(),
            vec![ElementBinding {
                observable_numeric_id: 1,
                property: "textContent".into(),
                paths_to_roots: vec![vec![0]],
            }],
        );
        payload.graph = DependencyGraph {
            nodes: vec![
                GraphNode { id: 0, parent_ids: vec![] },
                GraphNode { id: 1, parent_ids: vec![0] },
            ],
            root_ids: vec![0],
        };
        payload
    }

    #[test]
    fn wire_names_are_camel_case() {
        let value: Json = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(value["rootValues"]["0"], json!("</script><b>"));
        assert_eq!(
            value["bindingsByElementId"]["1"][0]["observableNumericId"],
            json!(1)
        );
        assert_eq!(value["graph"]["nodes"][1]["parentIds"], json!([0]));
        assert_eq!(value["graph"]["rootIds"], json!([0]));
    }

    #[test]
    fn msgpack_carries_the_same_payload() {
        let payload = sample();
        let bytes = payload.to_msgpack().unwrap();
        assert_eq!(HydrationPayload::from_msgpack(&bytes).unwrap(), payload);
    }

    #[test]
    fn script_tag_survives_extraction() {
        let config = RuntimeConfig::default();
        let payload = sample();
        let page = format!(
            "<main><p>hi</p></main>{}",
            payload.to_script_tag(&config).unwrap()
        );
        assert!(!page.contains("</script><b>"));
        assert_eq!(
            HydrationPayload::extract(&page, &config).unwrap(),
            Some(payload)
        );
        assert_eq!(HydrationPayload::extract("<p></p>", &config).unwrap(), None);
    }
}
