//! Ownership Scopes
//!
//! An owner collects every observable and cleanup created while it is the
//! innermost active scope, so a whole subtree of reactive state can be torn
//! down with one call. Keyed list entries each run their factory inside an
//! owner.
//!
//! # Implementation
//!
//! A thread-local stack tracks the active owners. [`Owner::run`] pushes the
//! owner, runs the closure and pops it through a guard, so the stack stays
//! balanced even if the closure panics. Nested owners are supported; only
//! the innermost one collects.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::observable::AnyObservable;
use super::subscriber::Cleanup;

thread_local! {
    static OWNER_STACK: RefCell<Vec<Owner>> = const { RefCell::new(Vec::new()) };
}

enum Owned {
    Observable(Arc<dyn AnyObservable>),
    Cleanup(Cleanup),
    Child(Owner),
}

#[derive(Default)]
struct OwnerInner {
    owned: Mutex<Vec<Owned>>,
    disposed: Mutex<bool>,
}

/// A disposable collection of reactive state.
#[derive(Clone, Default)]
pub struct Owner {
    inner: Arc<OwnerInner>,
}

/// Pops the owner stack when dropped.
struct OwnerGuard;

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        OWNER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Owner {
    /// Create an owner. If another owner is active it adopts this one, so
    /// disposing the outer owner disposes this one too.
    pub fn new() -> Self {
        let owner = Self::default();
        if let Some(parent) = Self::current() {
            parent.push(Owned::Child(owner.clone()));
        }
        owner
    }

    /// Create an owner not attached to any enclosing scope.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Run `f` with this owner as the innermost scope.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        OWNER_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = OwnerGuard;
        f()
    }

    /// The innermost active owner, if any.
    pub fn current() -> Option<Owner> {
        OWNER_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Hand an observable to the innermost owner, if one is active.
    pub(crate) fn track_observable(observable: Arc<dyn AnyObservable>) {
        if let Some(owner) = Self::current() {
            owner.push(Owned::Observable(observable));
        }
    }

    /// Hand a cleanup to the innermost owner. Without an active owner the
    /// cleanup is the caller's responsibility.
    pub fn track_cleanup(cleanup: Cleanup) {
        if let Some(owner) = Self::current() {
            owner.push(Owned::Cleanup(cleanup));
        }
    }

    fn push(&self, item: Owned) {
        if *self.inner.disposed.lock() {
            // Late registration on a dead scope: tear it down immediately.
            dispose_item(item);
            return;
        }
        self.inner.owned.lock().push(item);
    }

    /// Number of items owned directly by this scope.
    pub fn len(&self) -> usize {
        self.inner.owned.lock().len()
    }

    /// Whether this scope owns nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`Owner::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        *self.inner.disposed.lock()
    }

    /// Destroy everything owned, newest first. Idempotent.
    pub fn dispose(&self) {
        {
            let mut disposed = self.inner.disposed.lock();
            if *disposed {
                return;
            }
            *disposed = true;
        }
        let owned = std::mem::take(&mut *self.inner.owned.lock());
        for item in owned.into_iter().rev() {
            dispose_item(item);
        }
    }
}

fn dispose_item(item: Owned) {
    match item {
        Owned::Observable(o) => o.destroy(),
        Owned::Cleanup(c) => c.run(),
        Owned::Child(owner) => owner.dispose(),
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("owned", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn owner_collects_and_disposes_observables() {
        let owner = Owner::detached();
        let (root, doubled) = owner.run(|| {
            let root = Observable::new(1);
            let doubled = root.derive(|v| v * 2);
            (root, doubled)
        });

        assert_eq!(owner.len(), 2);
        owner.dispose();

        assert!(root.is_destroyed());
        assert!(doubled.is_destroyed());
        assert!(Owner::current().is_none());
    }

    #[test]
    fn nested_owner_is_disposed_with_parent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let outer = Owner::detached();
        let inner = outer.run(|| {
            let inner = Owner::new();
            let calls = calls.clone();
            inner.run(|| {
                Owner::track_cleanup(Cleanup::new(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                }));
                assert!(Owner::current().is_some());
            });
            inner
        });

        outer.dispose();
        outer.dispose();
        assert!(inner.is_disposed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
