//! Observable Implementation
//!
//! An Observable is the fundamental reactive primitive: a mutable cell that
//! notifies observers when its value changes.
//!
//! # How Observables Work
//!
//! 1. A root observable is created with [`Observable::new`] and written with
//!    [`Observable::set`].
//!
//! 2. A write that is not a [`SameValue`] no-op either notifies observers
//!    inline (synchronous mode, server rendering) or enqueues the observable
//!    in the [`Scheduler`] for a batched flush.
//!
//! 3. Derived observables ([`Observable::derive`], [`Observable::merge_from`])
//!    hold their parents for life. Each parent keeps a weak link back to the
//!    child and recomputes it before notifying its own observers.
//!
//! 4. [`Observable::destroy`] clears observers and runs every cleanup once,
//!    isolating failures so one bad cleanup cannot block the rest.
//!
//! # Registration
//!
//! Construction registers the observable with the active render context (so
//! server and client passes number observables identically) and with the
//! innermost [`Owner`] (so it is destroyed with its scope).
//!
//! # Thread Safety
//!
//! State lives behind `parking_lot` locks and the handle is `Send + Sync`,
//! but notification is cooperative: batched writes are flushed by the
//! scheduler of the thread that made them.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::owner::Owner;
use super::runtime::Runtime;
use super::scheduler::{Notify, Scheduler};
use super::subscriber::{Cleanup, SubscriberId};
use super::value::{SameValue, Value};
use crate::error::{Error, Result};
use crate::hydration::RenderContext;

/// Counter for generating unique observable IDs.
static OBSERVABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_observable_id() -> u64 {
    OBSERVABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Parent list of a derived observable. Most have one or two.
pub type Parents = SmallVec<[Arc<dyn AnyObservable>; 2]>;

type CleanupFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Type-erased view of an observable.
///
/// This is what registries, the graph codec and the hydration reconciler
/// work with, since they handle observables of many value types at once.
pub trait AnyObservable: Send + Sync {
    /// In-process unique id.
    fn id(&self) -> u64;

    /// Parents fixed at construction. Empty for roots.
    fn parents(&self) -> &[Arc<dyn AnyObservable>];

    /// Whether this observable was derived from others.
    fn is_derived(&self) -> bool {
        !self.parents().is_empty()
    }

    /// Current value as JSON.
    fn to_json(&self) -> Result<serde_json::Value>;

    /// Overwrite the value from JSON without notifying observers, then
    /// recompute derived descendants the same way.
    ///
    /// Returns `Ok(false)` when the decoded value equals the current one.
    fn hydrate_json(&self, value: &serde_json::Value) -> Result<bool>;

    /// Observe changes without caring about the value type.
    fn subscribe_changes(&self, f: Arc<dyn Fn() + Send + Sync>) -> Cleanup;

    /// Link a derived child for recomputation.
    fn add_dependent(&self, dependent: Weak<dyn Derivation>) -> SubscriberId;

    /// Unlink a derived child.
    fn remove_dependent(&self, id: SubscriberId);

    /// Clear observers and run cleanups. Idempotent.
    fn destroy(&self);

    /// Whether [`AnyObservable::destroy`] has run.
    fn is_destroyed(&self) -> bool;

    /// Whether writes notify inline rather than through the scheduler.
    fn is_sync(&self) -> bool;

    /// Name of the value type, for diagnostics.
    fn value_type(&self) -> &'static str;
}

/// Recompute hook a parent calls on its derived children.
pub trait Derivation: Send + Sync {
    /// Re-run the compute function and store the result.
    ///
    /// `silent` stores without notifying observers (hydration).
    fn recompute(&self, silent: bool);
}

struct Observer<T> {
    id: SubscriberId,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
    live: Arc<AtomicBool>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
            live: Arc::clone(&self.live),
        }
    }
}

struct Inner<T: Value> {
    this: Weak<Inner<T>>,
    id: u64,
    value: RwLock<T>,
    parents: Parents,
    compute: Option<Box<dyn Fn() -> T + Send + Sync>>,
    observers: Mutex<Vec<Observer<T>>>,
    dependents: Mutex<Vec<(SubscriberId, Weak<dyn Derivation>)>>,
    cleanups: Mutex<Vec<CleanupFn>>,
    sync: bool,
    destroyed: AtomicBool,
}

impl<T: Value> Inner<T> {
    /// Store `value` unless it is the same value. Returns whether it changed.
    fn store(&self, value: T) -> bool {
        let mut guard = self.value.write();
        if guard.same_value(&value) {
            return false;
        }
        *guard = value;
        true
    }

    fn write(&self, value: T, silent: bool) {
        if !self.store(value) {
            return;
        }
        if silent {
            self.propagate(true);
        } else if self.destroyed.load(Ordering::SeqCst) {
            // Value still lands, but nobody is listening.
        } else if self.sync {
            self.notify_observers();
        } else if let Some(this) = self.this.upgrade() {
            Scheduler::schedule_update(this as Arc<dyn Notify>);
        }
    }

    fn propagate(&self, silent: bool) {
        let dependents: Vec<_> = {
            let mut links = self.dependents.lock();
            // Children dropped without `destroy` leave dead links behind.
            links.retain(|(_, weak)| weak.strong_count() > 0);
            links.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for dependent in dependents {
            dependent.recompute(silent);
        }
    }

    fn push_observer(&self, callback: Arc<dyn Fn(&T) + Send + Sync>) -> Cleanup {
        let observer = Observer {
            id: SubscriberId::new(),
            callback,
            live: Arc::new(AtomicBool::new(true)),
        };
        let id = observer.id;
        let live = Arc::clone(&observer.live);
        self.observers.lock().push(observer);

        let weak = self.this.clone();
        Cleanup::new(move || {
            live.store(false, Ordering::SeqCst);
            if let Some(inner) = weak.upgrade() {
                inner.observers.lock().retain(|o| o.id != id);
            }
        })
    }
}

impl<T: Value> Notify for Inner<T> {
    fn notify_key(&self) -> u64 {
        self.id
    }

    fn notify_observers(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        // Derived children first so their own notifications join this flush.
        self.propagate(false);

        let value = self.value.read().clone();
        let observers: Vec<Observer<T>> = self.observers.lock().clone();
        for observer in observers {
            // An observer may unsubscribe a later one mid-loop.
            if observer.live.load(Ordering::SeqCst) {
                (observer.callback)(&value);
            }
        }
    }
}

impl<T: Value> Derivation for Inner<T> {
    fn recompute(&self, silent: bool) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(compute) = &self.compute {
            let value = compute();
            self.write(value, silent);
        }
    }
}

impl<T: Value> AnyObservable for Inner<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn parents(&self) -> &[Arc<dyn AnyObservable>] {
        &self.parents
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&*self.value.read())?)
    }

    fn hydrate_json(&self, value: &serde_json::Value) -> Result<bool> {
        let decoded: T = serde_json::from_value(value.clone())?;
        if !self.store(decoded) {
            return Ok(false);
        }
        self.propagate(true);
        Ok(true)
    }

    fn subscribe_changes(&self, f: Arc<dyn Fn() + Send + Sync>) -> Cleanup {
        self.push_observer(Arc::new(move |_: &T| f()))
    }

    fn add_dependent(&self, dependent: Weak<dyn Derivation>) -> SubscriberId {
        let id = SubscriberId::new();
        let mut links = self.dependents.lock();
        links.retain(|(_, weak)| weak.strong_count() > 0);
        links.push((id, dependent));
        id
    }

    fn remove_dependent(&self, id: SubscriberId) {
        self.dependents.lock().retain(|(d, _)| *d != id);
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        for observer in self.observers.lock().drain(..) {
            observer.live.store(false, Ordering::SeqCst);
        }

        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        let total = cleanups.len();
        let failed = cleanups
            .into_iter()
            .map(Runtime::isolate)
            .filter(|ok| !ok)
            .count();
        if failed > 0 {
            tracing::debug!(observable = self.id, failed, total, "cleanups failed during destroy");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn is_sync(&self) -> bool {
        self.sync
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning an `Observable` clones the handle; all clones share state.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Observable, Scheduler};
///
/// let count = Observable::new(1);
/// let doubled = count.derive(|n| n * 2);
///
/// count.set(5).unwrap();
/// Scheduler::flush_sync();
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Observable<T: Value> {
    inner: Arc<Inner<T>>,
}

impl<T: Value> Observable<T> {
    /// Create a root observable.
    ///
    /// Notification is synchronous when the active render context asks for
    /// it (server rendering, or `sync_updates` in its config), batched
    /// otherwise.
    pub fn new(value: T) -> Self {
        let sync = RenderContext::current().is_some_and(|cx| cx.notifies_synchronously());
        Self::build(value, Parents::new(), None, sync)
    }

    /// Create a root observable that always notifies inline, bypassing the
    /// scheduler.
    pub fn new_sync(value: T) -> Self {
        Self::build(value, Parents::new(), None, true)
    }

    /// Create an observable recomputed from `parents` by `compute` whenever
    /// any of them changes.
    ///
    /// Fails with [`Error::NoDependencies`] for an empty parent list.
    pub fn merge_from<F, I>(compute: F, parents: I) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        I: IntoIterator<Item = Arc<dyn AnyObservable>>,
    {
        let parents: Parents = parents.into_iter().collect();
        if parents.is_empty() {
            return Err(Error::NoDependencies);
        }
        Ok(Self::derived_from(compute, parents))
    }

    fn derived_from<F>(compute: F, parents: Parents) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let sync = RenderContext::current().is_some_and(|cx| cx.notifies_synchronously())
            || parents.iter().any(|p| p.is_sync());
        let value = compute();
        let observable = Self::build(value, parents, Some(Box::new(compute)), sync);

        let weak: Weak<Inner<T>> = Arc::downgrade(&observable.inner);
        let weak: Weak<dyn Derivation> = weak;
        for parent in observable.inner.parents.iter() {
            let link = parent.add_dependent(weak.clone());
            let parent = Arc::clone(parent);
            observable.push_cleanup(Box::new(move || {
                parent.remove_dependent(link);
                Ok(())
            }));
        }
        observable
    }

    fn build(
        value: T,
        parents: Parents,
        compute: Option<Box<dyn Fn() -> T + Send + Sync>>,
        sync: bool,
    ) -> Self {
        let observable = Self {
            inner: Arc::new_cyclic(|this| Inner {
                this: this.clone(),
                id: next_observable_id(),
                value: RwLock::new(value),
                parents,
                compute,
                observers: Mutex::new(Vec::new()),
                dependents: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
                sync,
                destroyed: AtomicBool::new(false),
            }),
        };

        if let Some(cx) = RenderContext::current() {
            cx.register_observable(observable.erased());
        }
        Owner::track_observable(observable.erased());
        observable
    }

    /// Get the observable's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Call `f` with the current value.
    ///
    /// `f` sees a snapshot and may write back to this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.get();
        f(&value)
    }

    /// Set a new value.
    ///
    /// A [`SameValue`] assignment is a no-op. Derived observables refuse
    /// external writes with [`Error::DerivedAssignment`].
    pub fn set(&self, value: T) -> Result<()> {
        if self.is_derived() {
            return Err(Error::DerivedAssignment { id: self.inner.id });
        }
        self.inner.write(value, false);
        Ok(())
    }

    /// Set a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = self.with(f);
        self.set(next)
    }

    /// Call `f` with every future value. The current value is not delivered.
    pub fn observe<F>(&self, f: F) -> Cleanup
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.push_observer(Arc::new(f))
    }

    /// Call `f(current, &target)` now, then again on every change.
    ///
    /// Every reactive DOM property is built on this.
    pub fn bind<B, F>(&self, target: B, f: F) -> Cleanup
    where
        B: Send + Sync + 'static,
        F: Fn(&T, &B) + Send + Sync + 'static,
    {
        let current = self.get();
        f(&current, &target);
        self.observe(move |v| f(v, &target))
    }

    /// Create an observable holding `transform(value)`, kept up to date.
    pub fn derive<U, F>(&self, transform: F) -> Observable<U>
    where
        U: Value,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let parent = self.clone();
        let mut parents = Parents::new();
        parents.push(self.erased());
        Observable::derived_from(move || transform(&parent.get()), parents)
    }

    /// Register a cleanup to run on [`Observable::destroy`].
    ///
    /// Runs at once if the observable is already destroyed.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.push_cleanup(Box::new(f));
    }

    fn push_cleanup(&self, f: CleanupFn) {
        if self.is_destroyed() {
            Runtime::isolate(f);
            return;
        }
        self.inner.cleanups.lock().push(f);
    }

    /// Parents fixed at construction.
    pub fn parents(&self) -> &[Arc<dyn AnyObservable>] {
        &self.inner.parents
    }

    /// Whether this observable was derived from others.
    pub fn is_derived(&self) -> bool {
        !self.inner.parents.is_empty()
    }

    /// Whether writes notify inline rather than through the scheduler.
    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Clear observers, then run every cleanup exactly once.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Whether [`Observable::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// A type-erased handle to the same observable.
    pub fn erased(&self) -> Arc<dyn AnyObservable> {
        Arc::clone(&self.inner) as Arc<dyn AnyObservable>
    }

    /// Whether two handles point to the same observable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Value> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Value + Debug> Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("derived", &self.is_derived())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<Mutex<Vec<i32>>>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn observable_get_and_set() {
        let observable = Observable::new_sync(0);
        assert_eq!(observable.get(), 0);

        observable.set(42).unwrap();
        assert_eq!(observable.get(), 42);
    }

    #[test]
    fn observe_skips_current_value_and_sees_changes() {
        let observable = Observable::new_sync(1);
        let (calls, seen) = counter();
        let (calls_clone, seen_clone) = (calls.clone(), seen.clone());
        observable.observe(move |v| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            seen_clone.lock().push(*v);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        observable.set(2).unwrap();
        observable.set(2).unwrap();
        observable.set(3).unwrap();

        assert_eq!(*seen.lock(), vec![2, 3]);
    }

    #[test]
    fn float_assignment_follows_same_value() {
        let observable = Observable::new_sync(f64::NAN);
        let (calls, _) = counter();
        let calls_clone = calls.clone();
        observable.observe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        observable.set(f64::NAN).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        observable.set(0.0).unwrap();
        observable.set(-0.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_targeted() {
        let observable = Observable::new_sync(0);
        let (calls, _) = counter();
        let callback = {
            let calls = calls.clone();
            move |_: &i32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        };
        let first = observable.observe(callback.clone());
        let _second = observable.observe(callback);

        first.run();
        first.run();
        assert_eq!(observable.observer_count(), 1);

        observable.set(1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bind_runs_immediately_then_on_change() {
        let observable = Observable::new_sync(String::from("a"));
        let log = Arc::new(Mutex::new(Vec::new()));
        observable.bind(log.clone(), |v: &String, log: &Arc<Mutex<Vec<String>>>| {
            log.lock().push(v.clone());
        });

        observable.set("b".to_string()).unwrap();
        assert_eq!(*log.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn derived_rejects_assignment() {
        let root = Observable::new_sync(1);
        let derived = root.derive(|v| v + 1);
        assert!(derived.is_derived());
        assert_eq!(derived.parents().len(), 1);
        assert!(matches!(derived.set(5), Err(Error::DerivedAssignment { .. })));
    }

    #[test]
    fn derive_chain_stays_consistent() {
        let root = Observable::new(2);
        let plus_one = root.derive(|v| v + 1);
        let squared = plus_one.derive(|v| v * v);

        root.set(4).unwrap();
        Scheduler::flush_sync();
        assert_eq!(squared.get(), 25);
    }

    #[test]
    fn merge_requires_parents_and_tracks_each() {
        let empty: Vec<Arc<dyn AnyObservable>> = Vec::new();
        assert!(matches!(
            Observable::merge_from(|| 0, empty),
            Err(Error::NoDependencies)
        ));

        let a = Observable::new(1);
        let b = Observable::new(2);
        let unrelated = Observable::new(100);
        let sum = {
            let parents = [a.erased(), b.erased()];
            let (a, b) = (a.clone(), b.clone());
            Observable::merge_from(move || a.get() + b.get(), parents).unwrap()
        };
        assert_eq!(sum.get(), 3);

        let (calls, _) = counter();
        let calls_clone = calls.clone();
        sum.observe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        a.set(10).unwrap();
        Scheduler::flush_sync();
        assert_eq!(sum.get(), 12);

        b.set(20).unwrap();
        Scheduler::flush_sync();
        assert_eq!(sum.get(), 30);

        unrelated.set(0).unwrap();
        Scheduler::flush_sync();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batched_writes_coalesce() {
        let observable = Observable::new(0);
        let (calls, seen) = counter();
        let (calls_clone, seen_clone) = (calls.clone(), seen.clone());
        observable.observe(move |v| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            seen_clone.lock().push(*v);
        });

        observable.set(1).unwrap();
        observable.set(2).unwrap();
        observable.set(3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        Scheduler::flush_sync();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[test]
    fn destroy_runs_all_cleanups_despite_failures() {
        let observable = Observable::new_sync(0);
        let (ran, _) = counter();
        let reported = Arc::new(AtomicUsize::new(0));

        let ran_a = ran.clone();
        observable.on_cleanup(move || {
            ran_a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        observable.on_cleanup(|| Err(Error::Cleanup("first".into())));
        observable.on_cleanup(|| panic!("second"));
        let ran_b = ran.clone();
        observable.on_cleanup(move || {
            ran_b.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let reported_clone = reported.clone();
        Runtime::with_error_sink(
            Arc::new(move |_| {
                reported_clone.fetch_add(1, Ordering::SeqCst);
            }),
            || {
                observable.destroy();
                observable.destroy();
            },
        );

        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(reported.load(Ordering::SeqCst), 2);
        assert!(observable.is_destroyed());
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn destroying_derived_unlinks_from_parent() {
        let root = Observable::new_sync(1);
        let (calls, _) = counter();
        let derived = {
            let calls = calls.clone();
            root.derive(move |v| {
                calls.fetch_add(1, Ordering::SeqCst);
                v * 10
            })
        };
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        derived.destroy();
        root.set(2).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(derived.get(), 10);
    }

    #[test]
    fn callbacks_may_write_back_to_their_source() {
        let level = Observable::new_sync(-1);
        let clamp = level.clone();
        level.bind((), move |v: &i32, _: &()| {
            if *v < 0 {
                clamp.set(0).unwrap();
            }
        });
        assert_eq!(level.get(), 0);

        level.set(-5).unwrap();
        assert_eq!(level.get(), 0);

        let seen = level.with(|v| {
            level.set(7).unwrap();
            *v
        });
        assert_eq!(seen, 0);
        assert_eq!(level.get(), 7);

        let writer = level.clone();
        let doubled = level.derive(move |v| {
            writer.with(|w| *w);
            v * 2
        });
        level.set(4).unwrap();
        assert_eq!(doubled.get(), 8);
    }

    #[test]
    fn dropped_children_do_not_accumulate_links() {
        let root = Observable::new_sync(0);
        for _ in 0..10 {
            drop(root.derive(|n| n + 1));
        }
        let kept = root.derive(|n| n * 2);
        assert_eq!(root.inner.dependents.lock().len(), 1);

        root.set(3).unwrap();
        assert_eq!(kept.get(), 6);

        drop(kept);
        root.set(4).unwrap();
        assert!(root.inner.dependents.lock().is_empty());
    }

    #[test]
    fn hydrate_json_writes_silently_and_recomputes() {
        let root = Observable::new_sync(0);
        let label = root.derive(|n| format!("Count: {n}"));
        let (calls, _) = counter();
        let calls_clone = calls.clone();
        label.observe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let changed = root.erased().hydrate_json(&serde_json::json!(42)).unwrap();
        assert!(changed);
        assert_eq!(root.get(), 42);
        assert_eq!(label.get(), "Count: 42");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(!root.erased().hydrate_json(&serde_json::json!(42)).unwrap());
        assert!(root.erased().hydrate_json(&serde_json::json!("nope")).is_err());
    }
}
