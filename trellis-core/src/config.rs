//! Runtime Configuration
//!
//! Settings that must agree between the server pass and the client pass
//! (attribute and marker names) plus the two behavior switches: batched vs.
//! synchronous notification, and production-mode marker elision.
//!
//! A config travels with each render context. Code that runs outside any
//! context uses [`RuntimeConfig::default`].

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix for environment overrides read by [`RuntimeConfig::from_env`].
pub const ENV_PREFIX: &str = "TRELLIS_";

/// Configuration shared by render, hydration and fragment code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Attribute carrying the stable element id.
    pub element_id_attribute: String,

    /// Comment text prefix of a fragment's start marker.
    pub start_marker_prefix: String,

    /// Comment text prefix of a fragment's end marker.
    pub end_marker_prefix: String,

    /// Drop boundary comments of fragments adopted during hydration and
    /// track their nodes in memory instead.
    ///
    /// External DOM mutation between elision and the next structural change
    /// can desynchronize the remembered anchor, so this is opt-in.
    pub elide_markers: bool,

    /// Notify observers inline instead of batching into the scheduler.
    pub sync_updates: bool,

    /// Id of the `<script>` element embedding the hydration payload.
    pub payload_script_id: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            element_id_attribute: "data-hk".to_string(),
            start_marker_prefix: "s:".to_string(),
            end_marker_prefix: "e:".to_string(),
            elide_markers: false,
            sync_updates: false,
            payload_script_id: "__trellis_hydration".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a config from `TRELLIS_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let flag = |name: &str| {
            var(name).and_then(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
        };

        let mut config = Self::default();
        if let Some(v) = var("ELEMENT_ID_ATTRIBUTE") {
            config.element_id_attribute = v;
        }
        if let Some(v) = var("START_MARKER_PREFIX") {
            config.start_marker_prefix = v;
        }
        if let Some(v) = var("END_MARKER_PREFIX") {
            config.end_marker_prefix = v;
        }
        if let Some(v) = flag("ELIDE_MARKERS") {
            config.elide_markers = v;
        }
        if let Some(v) = flag("SYNC_UPDATES") {
            config.sync_updates = v;
        }
        if let Some(v) = var("PAYLOAD_SCRIPT_ID") {
            config.payload_script_id = v;
        }
        config
    }

    /// Enable or disable marker elision.
    pub fn with_elide_markers(mut self, elide: bool) -> Self {
        self.elide_markers = elide;
        self
    }

    /// Enable or disable synchronous notification.
    pub fn with_sync_updates(mut self, sync: bool) -> Self {
        self.sync_updates = sync;
        self
    }

    /// Use a different stable element id attribute.
    pub fn with_element_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.element_id_attribute = name.into();
        self
    }

    /// Comment text of a fragment's start marker.
    pub fn start_marker(&self, fragment_id: u64) -> String {
        format!("{}{}", self.start_marker_prefix, fragment_id)
    }

    /// Comment text of a fragment's end marker.
    pub fn end_marker(&self, fragment_id: u64) -> String {
        format!("{}{}", self.end_marker_prefix, fragment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{"elideMarkers": true}"#).unwrap();
        assert!(config.elide_markers);
        assert_eq!(config.element_id_attribute, "data-hk");
        assert_eq!(config.start_marker(7), "s:7");
        assert_eq!(config.end_marker(7), "e:7");
    }

    #[test]
    fn env_lookup_overrides_fields() {
        let env: HashMap<String, String> = [
            ("TRELLIS_ELEMENT_ID_ATTRIBUTE", "data-id"),
            ("TRELLIS_SYNC_UPDATES", "yes"),
            ("TRELLIS_ELIDE_MARKERS", "maybe"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = RuntimeConfig::from_lookup(|key| env.get(key).cloned());
        assert_eq!(config.element_id_attribute, "data-id");
        assert!(config.sync_updates);
        // Unparsable flag keeps the default.
        assert!(!config.elide_markers);
    }
}
