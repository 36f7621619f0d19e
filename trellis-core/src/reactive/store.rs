//! Keyed Stores
//!
//! A store is a tree of named observables built from a JSON object. Object
//! members become nested stores, everything else becomes a leaf
//! `Observable<serde_json::Value>`. Access is explicit (`get`, `set`,
//! `entries`); there is no transparent property interception.
//!
//! Leaves are ordinary observables, so they register with the active render
//! context and owner like any other and can be bound to DOM properties.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};

use super::observable::Observable;
use crate::error::Result;

/// One member of a [`Store`].
#[derive(Debug, Clone)]
pub enum StoreEntry {
    /// A scalar or array value.
    Leaf(Observable<Json>),
    /// A nested object.
    Branch(Store),
}

impl StoreEntry {
    fn from_json(value: Json) -> Self {
        match value {
            Json::Object(map) => StoreEntry::Branch(Store::from_map(map)),
            other => StoreEntry::Leaf(Observable::new(other)),
        }
    }

    /// The leaf observable, if this entry is a leaf.
    pub fn as_leaf(&self) -> Option<&Observable<Json>> {
        match self {
            StoreEntry::Leaf(o) => Some(o),
            StoreEntry::Branch(_) => None,
        }
    }

    /// The nested store, if this entry is a branch.
    pub fn as_branch(&self) -> Option<&Store> {
        match self {
            StoreEntry::Branch(s) => Some(s),
            StoreEntry::Leaf(_) => None,
        }
    }

    fn to_json(&self) -> Json {
        match self {
            StoreEntry::Leaf(o) => o.get(),
            StoreEntry::Branch(s) => s.to_json(),
        }
    }

    fn destroy(&self) {
        match self {
            StoreEntry::Leaf(o) => o.destroy(),
            StoreEntry::Branch(s) => s.destroy(),
        }
    }
}

/// A tree of named observables.
#[derive(Debug, Clone, Default)]
pub struct Store {
    entries: Arc<RwLock<IndexMap<String, StoreEntry>>>,
}

impl Store {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON value. Non-object input yields a store
    /// with a single `"value"` leaf.
    pub fn from_json(value: Json) -> Self {
        match value {
            Json::Object(map) => Self::from_map(map),
            other => {
                let store = Self::new();
                store
                    .entries
                    .write()
                    .insert("value".to_string(), StoreEntry::from_json(other));
                store
            }
        }
    }

    fn from_map(map: Map<String, Json>) -> Self {
        let entries = map
            .into_iter()
            .map(|(k, v)| (k, StoreEntry::from_json(v)))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Look up a member.
    pub fn get(&self, key: &str) -> Option<StoreEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Look up a leaf by a dotted path such as `"user.name"`.
    pub fn leaf(&self, path: &str) -> Option<Observable<Json>> {
        let mut parts = path.split('.').peekable();
        let mut store = self.clone();
        while let Some(part) = parts.next() {
            let entry = store.get(part)?;
            if parts.peek().is_none() {
                return entry.as_leaf().cloned();
            }
            store = entry.as_branch()?.clone();
        }
        None
    }

    /// Write a member.
    ///
    /// Writing a non-object to an existing leaf updates that leaf in place,
    /// so its observers see the change. Writing an object merges into an
    /// existing branch member by member. Any other shape change replaces the
    /// entry and destroys the old one.
    pub fn set(&self, key: &str, value: Json) -> Result<()> {
        let existing = self.get(key);
        match (existing, value) {
            (Some(StoreEntry::Leaf(leaf)), value) if !value.is_object() => leaf.set(value),
            (Some(StoreEntry::Branch(branch)), Json::Object(map)) => {
                for (k, v) in map {
                    branch.set(&k, v)?;
                }
                Ok(())
            }
            (old, value) => {
                let entry = StoreEntry::from_json(value);
                self.entries.write().insert(key.to_string(), entry);
                if let Some(old) = old {
                    old.destroy();
                }
                Ok(())
            }
        }
    }

    /// Remove a member, destroying its observables.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.write().shift_remove(key);
        match removed {
            Some(entry) => {
                entry.destroy();
                true
            }
            None => false,
        }
    }

    /// Members in insertion order.
    pub fn entries(&self) -> Vec<(String, StoreEntry)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of direct members.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the whole tree as JSON.
    pub fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Json::Object(map)
    }

    /// Destroy every observable in the tree.
    pub fn destroy(&self) {
        let entries = std::mem::take(&mut *self.entries.write());
        for entry in entries.values() {
            entry.destroy();
        }
    }
}
