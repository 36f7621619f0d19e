//! Keyed List Mount
//!
//! Mounts an `Observable<Vec<I>>` into a container through a [`Fragment`]
//! anchor, keeping one mounted entry per key.
//!
//! # Reconciliation
//!
//! On every change (the initial mount counts as one):
//!
//! 1. Entries whose key disappeared are detached and their owner disposed,
//!    before anything moves, so destroyed nodes never linger mid-list.
//! 2. Keys without an entry get one from the factory, in item order.
//! 3. Items are walked from the end with an anchor starting at the
//!    fragment's end marker. An entry already sitting right before the
//!    anchor is left alone; otherwise it is moved with one insert. The
//!    anchor then becomes the entry's first node.
//!
//! Items already in the right relative order cost no DOM operations. The
//! attached hook fires for new entries once they are in the document.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::document::Document;
use super::fragment::{Fragment, View};
use super::node::NodeId;
use crate::error::{HydrationError, Result};
use crate::hydration::RenderContext;
use crate::reactive::{Cleanup, Observable, Owner, Runtime, Value};

type KeyFn<I, K> = Box<dyn Fn(&I) -> K + Send + Sync>;
type Factory<I> = Box<dyn Fn(&I) -> View + Send + Sync>;
type AttachedHook<K> = Arc<dyn Fn(&K, &View) + Send + Sync>;

struct Entry {
    view: View,
    owner: Owner,
}

struct ListInner<I: Value, K> {
    document: Document,
    items: Observable<Vec<I>>,
    fragment: Fragment,
    get_key: KeyFn<I, K>,
    factory: Factory<I>,
    on_attached: Mutex<Option<AttachedHook<K>>>,
    entries: Mutex<IndexMap<K, Entry>>,
    subscription: Mutex<Option<Cleanup>>,
    reconciling: AtomicBool,
    dirty: AtomicBool,
    hydrating: AtomicBool,
}

/// A keyed list bound to an observable array.
pub struct KeyedList<I: Value, K> {
    inner: Arc<ListInner<I, K>>,
}

impl<I: Value, K> Clone for KeyedList<I, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Clears the reconciling flag even if a pass fails.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<I, K> KeyedList<I, K>
where
    I: Value,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create an unmounted list.
    ///
    /// The anchor fragment is created here, so inside a hydration pass it
    /// adopts the server's markers.
    pub fn new<KF, F>(document: &Document, items: &Observable<Vec<I>>, get_key: KF, factory: F) -> Self
    where
        KF: Fn(&I) -> K + Send + Sync + 'static,
        F: Fn(&I) -> View + Send + Sync + 'static,
    {
        let fragment = Fragment::new(document);
        let hydrating = RenderContext::current().is_some_and(|cx| cx.is_hydrating())
            && fragment.is_attached();
        let list = Self {
            inner: Arc::new(ListInner {
                document: document.clone(),
                items: items.clone(),
                fragment,
                get_key: Box::new(get_key),
                factory: Box::new(factory),
                on_attached: Mutex::new(None),
                entries: Mutex::new(IndexMap::new()),
                subscription: Mutex::new(None),
                reconciling: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
                hydrating: AtomicBool::new(hydrating),
            }),
        };

        // Nested lists go away with the entry that created them.
        let weak = Arc::downgrade(&list.inner);
        Owner::track_cleanup(Cleanup::new(move || {
            if let Some(inner) = weak.upgrade() {
                KeyedList { inner }.unmount();
            }
        }));
        list
    }

    /// Set the hook fired for each new entry after it is inserted.
    pub fn on_attached<H>(self, hook: H) -> Self
    where
        H: Fn(&K, &View) + Send + Sync + 'static,
    {
        *self.inner.on_attached.lock() = Some(Arc::new(hook));
        self
    }

    /// Place the anchor fragment in `container` (unless it was adopted),
    /// reconcile once and follow the items observable.
    pub fn mount(&self, container: NodeId, anchor: Option<NodeId>) -> Result<()> {
        if !self.inner.fragment.is_attached() {
            self.inner.fragment.append_to(container, anchor)?;
        }
        self.reconcile()?;

        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.items.observe(move |_| {
            if let Some(inner) = weak.upgrade() {
                let list = KeyedList { inner };
                if let Err(err) = list.reconcile() {
                    Runtime::report(&err);
                }
            }
        });
        if let Some(previous) = self.inner.subscription.lock().replace(subscription) {
            previous.run();
        }
        Ok(())
    }

    /// Bring the DOM in line with the current items.
    pub fn reconcile(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.reconciling.swap(true, Ordering::SeqCst) {
            // A factory or hook changed the items mid-pass.
            inner.dirty.store(true, Ordering::SeqCst);
            return Ok(());
        }
        let _guard = PassGuard(&inner.reconciling);

        loop {
            inner.dirty.store(false, Ordering::SeqCst);
            self.reconcile_once()?;
            if !inner.dirty.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    fn reconcile_once(&self) -> Result<()> {
        let inner = &self.inner;
        let document = &inner.document;
        let items = inner.items.get();
        let keys: Vec<K> = items.iter().map(|item| (inner.get_key)(item)).collect();
        let wanted: HashSet<&K> = keys.iter().collect();

        let mut entries = std::mem::take(&mut *inner.entries.lock());

        let stale: Vec<K> = entries
            .keys()
            .filter(|k| !wanted.contains(k))
            .cloned()
            .collect();
        for key in &stale {
            if let Some(entry) = entries.shift_remove(key) {
                entry.view.remove(document);
                entry.owner.dispose();
            }
        }

        let fragment = &inner.fragment;
        let parent = match fragment.parent() {
            Some(parent) => parent,
            None => {
                *inner.entries.lock() = entries;
                return Ok(());
            }
        };
        // Moves are relative to the end marker, so elided markers come back.
        let (_, end) = match fragment.live_markers() {
            Ok(markers) => markers,
            Err(err) => {
                *inner.entries.lock() = entries;
                return Err(err);
            }
        };

        // New entries are built in item order so element ids follow
        // document order.
        let mut fresh = HashSet::new();
        for (item, key) in items.iter().zip(&keys) {
            if entries.contains_key(key) {
                continue;
            }
            let owner = Owner::detached();
            let view = owner.run(|| (inner.factory)(item));
            entries.insert(key.clone(), Entry { view, owner });
            fresh.insert(key.clone());
        }

        let mut ordered: IndexMap<K, Entry> = IndexMap::with_capacity(keys.len());
        let mut attached = Vec::new();
        let mut anchor = end;
        let mut moves = 0usize;

        for key in keys.iter().rev() {
            let Some(entry) = entries.shift_remove(key) else {
                tracing::warn!("duplicate key in keyed list; keeping the last occurrence");
                continue;
            };

            if document.next_sibling(entry.view.last_node()) != Some(anchor) {
                if let Err(err) = entry.view.insert(document, parent, Some(anchor)) {
                    // Keep every entry, earlier keys first.
                    let mut restored = entries;
                    restored.insert(key.clone(), entry);
                    ordered.reverse();
                    restored.extend(ordered);
                    *inner.entries.lock() = restored;
                    return Err(err);
                }
                moves += 1;
            }
            anchor = entry.view.first_node();
            if fresh.contains(key) {
                attached.push((key.clone(), entry.view.clone()));
            }
            ordered.insert(key.clone(), entry);
        }
        ordered.reverse();

        if inner.hydrating.swap(false, Ordering::SeqCst) {
            self.drop_unowned(&ordered);
        }

        tracing::debug!(
            items = ordered.len(),
            removed = stale.len(),
            created = attached.len(),
            moves,
            "keyed list reconciled"
        );
        *inner.entries.lock() = ordered;

        let hook = inner.on_attached.lock().clone();
        if let Some(hook) = hook {
            for (key, view) in attached.iter().rev() {
                hook(key, view);
            }
        }
        Ok(())
    }

    /// Remove interior nodes no entry owns (stale server markup).
    fn drop_unowned(&self, entries: &IndexMap<K, Entry>) {
        let owned: HashSet<NodeId> = entries
            .values()
            .flat_map(|e| e.view.top_level_nodes())
            .collect();
        let mut removed = 0usize;
        for node in self.inner.fragment.nodes() {
            if !owned.contains(&node) && self.inner.document.remove(node) {
                removed += 1;
            }
        }
        if removed == 0 {
            return;
        }
        let mismatch = HydrationError::UnownedNodes {
            fragment: self.inner.fragment.id(),
            removed,
        };
        match RenderContext::current() {
            Some(cx) => cx.report_mismatch(mismatch),
            None => tracing::warn!(%mismatch, "hydration mismatch"),
        }
    }

    /// Detach every entry and stop following the items.
    pub fn unmount(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.run();
        }
        let entries = std::mem::take(&mut *self.inner.entries.lock());
        for (_, entry) in entries {
            entry.view.remove(&self.inner.document);
            entry.owner.dispose();
        }
        self.inner.fragment.remove();
    }

    /// The anchor fragment.
    pub fn fragment(&self) -> &Fragment {
        &self.inner.fragment
    }

    /// Mounted keys in list order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// The mounted view for `key`.
    pub fn view(&self, key: &K) -> Option<View> {
        self.inner.entries.lock().get(key).map(|e| e.view.clone())
    }

    /// Number of mounted entries.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementBuilder;
    use crate::reactive::Scheduler;
    use std::sync::atomic::AtomicUsize;

    fn mount(
        doc: &Document,
        items: &Observable<Vec<String>>,
        calls: Arc<AtomicUsize>,
    ) -> (KeyedList<String, String>, NodeId) {
        let host = doc.create_element("ul");
        doc.append_child(doc.root(), host).unwrap();
        let factory_doc = doc.clone();
        let list = KeyedList::new(doc, items, |s: &String| s.clone(), move |s: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            let li = ElementBuilder::new("li").text(s.as_str()).build(&factory_doc).unwrap();
            View::Node(li)
        });
        list.mount(host, None).unwrap();
        (list, host)
    }

    fn labels(doc: &Document, list: &KeyedList<String, String>) -> String {
        list.fragment()
            .nodes()
            .into_iter()
            .map(|n| doc.text_content(n))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rotation_reuses_entries_with_minimal_moves() {
        let doc = Document::new();
        let items = Observable::new_sync(strings(&["A", "B", "C"]));
        let calls = Arc::new(AtomicUsize::new(0));
        let (list, _) = mount(&doc, &items, Arc::clone(&calls));
        assert_eq!(labels(&doc, &list), "A,B,C");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        doc.stats().reset();
        items.set(strings(&["C", "A", "B"])).unwrap();

        assert_eq!(labels(&doc, &list), "C,A,B");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(doc.stats().inserts(), 2);
        assert_eq!(list.keys(), strings(&["C", "A", "B"]));
    }

    #[test]
    fn appending_costs_one_insert() {
        let doc = Document::new();
        let items = Observable::new_sync(strings(&["A", "B"]));
        let (list, _) = mount(&doc, &items, Arc::new(AtomicUsize::new(0)));

        doc.stats().reset();
        items.set(strings(&["A", "B", "C"])).unwrap();
        assert_eq!(labels(&doc, &list), "A,B,C");
        assert_eq!(doc.stats().inserts(), 1);
    }

    #[test]
    fn removed_keys_are_unmounted_and_disposed() {
        let doc = Document::new();
        let items = Observable::new(strings(&["A", "B", "C"]));
        let shared = Observable::new(0);
        let host = doc.create_element("ul");
        let markers = Arc::new(Mutex::new(Vec::new()));
        let factory_markers = Arc::clone(&markers);
        let shared_in_factory = shared.clone();
        let factory_doc = doc.clone();
        let list = KeyedList::new(&doc, &items, |s: &String| s.clone(), move |s: &String| {
            let marker = shared_in_factory.derive(|n| *n);
            factory_markers.lock().push((s.clone(), marker.clone()));
            let li = ElementBuilder::new("li")
                .prop("value", &marker)
                .text(s.as_str())
                .build(&factory_doc)
                .unwrap();
            View::Node(li)
        });
        list.mount(host, None).unwrap();
        let b = match list.view(&"B".to_string()) {
            Some(View::Node(node)) => node,
            other => panic!("unexpected view {other:?}"),
        };

        items.set(strings(&["A", "C"])).unwrap();
        Scheduler::flush_sync();

        assert_eq!(labels(&doc, &list), "A,C");
        assert_eq!(doc.parent(b), None);
        assert_eq!(list.len(), 2);
        for (key, marker) in markers.lock().iter() {
            assert_eq!(marker.is_destroyed(), key == "B", "entry {key}");
        }

        shared.set(5).unwrap();
        Scheduler::flush_sync();
        let a = list.view(&"A".to_string()).unwrap().first_node();
        assert_eq!(doc.property(a, "value"), Some(serde_json::json!(5)));
    }

    #[test]
    fn entry_ids_follow_item_order() {
        let cx = RenderContext::server(crate::config::RuntimeConfig::default());
        let doc = Document::new();
        let html = cx.enter(|| {
            let items = Observable::new(strings(&["A", "B", "C"]));
            let host = doc.create_element("ul");
            let factory_doc = doc.clone();
            let list = KeyedList::new(&doc, &items, |s: &String| s.clone(), move |s: &String| {
                let label = Observable::new(s.clone());
                View::Node(ElementBuilder::new("li").text(&label).build(&factory_doc).unwrap())
            });
            list.mount(host, None).unwrap();
            doc.to_html(host)
        });
        assert_eq!(
            html,
            r#"<ul><!--s:0--><li data-hk="1">A</li><li data-hk="2">B</li><li data-hk="3">C</li><!--e:0--></ul>"#
        );
    }

    #[test]
    fn failed_pass_keeps_its_entries() {
        let doc = Document::new();
        let items = Observable::new(strings(&["A", "B"]));
        let calls = Arc::new(AtomicUsize::new(0));
        let (list, host) = mount(&doc, &items, Arc::clone(&calls));
        let (_, end) = list.fragment().markers().unwrap();
        let elsewhere = doc.create_element("div");
        doc.append_child(elsewhere, end).unwrap();

        assert!(list.reconcile().is_err());
        assert_eq!(list.keys(), strings(&["A", "B"]));
        assert_eq!(list.len(), 2);

        doc.append_child(host, end).unwrap();
        list.reconcile().unwrap();
        assert_eq!(labels(&doc, &list), "A,B");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attached_hook_sees_connected_nodes() {
        let doc = Document::new();
        let host = doc.create_element("ul");
        doc.append_child(doc.root(), host).unwrap();
        let items = Observable::new_sync(strings(&["A"]));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let hook_doc = doc.clone();
        let hook_seen = Arc::clone(&seen);
        let factory_doc = doc.clone();
        let list = KeyedList::new(&doc, &items, |s: &String| s.clone(), move |_: &String| {
            View::Node(factory_doc.create_element("li"))
        })
        .on_attached(move |key: &String, view: &View| {
            hook_seen
                .lock()
                .push((key.clone(), hook_doc.is_connected(view.first_node())));
        });
        list.mount(host, None).unwrap();
        items.set(strings(&["A", "B"])).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![("A".to_string(), true), ("B".to_string(), true)]
        );
    }

    #[test]
    fn fragment_entries_move_as_a_unit() {
        let doc = Document::new();
        let host = doc.create_element("div");
        let items = Observable::new_sync(strings(&["x", "y"]));
        let factory_doc = doc.clone();
        let list = KeyedList::new(&doc, &items, |s: &String| s.clone(), move |s: &String| {
            let fragment = Fragment::new(&factory_doc);
            fragment.append_child(factory_doc.create_text(s.as_str())).unwrap();
            fragment.append_child(factory_doc.create_text("!")).unwrap();
            View::Fragment(fragment)
        });
        list.mount(host, None).unwrap();

        items.set(strings(&["y", "x"])).unwrap();
        assert_eq!(list.fragment().text_content(), "y!x!");

        list.unmount();
        assert!(doc.children(host).is_empty());
    }
}
