//! Subscriber ids and cleanup handles.
//!
//! Every registration on an observable gets its own [`SubscriberId`], so
//! registering the same closure twice yields two independent subscriptions
//! and removing one never removes the other.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Thunk = Box<dyn FnOnce() + Send>;

/// An idempotent unsubscribe handle.
///
/// Calling [`Cleanup::run`] more than once is a no-op after the first call.
/// Clones share the same underlying thunk. Dropping a `Cleanup` does *not*
/// unsubscribe; ownership scopes decide when subscriptions end.
#[derive(Clone)]
pub struct Cleanup {
    thunk: Arc<Mutex<Option<Thunk>>>,
}

impl Cleanup {
    /// Wrap a thunk.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            thunk: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// A cleanup that does nothing.
    pub fn noop() -> Self {
        Self {
            thunk: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the thunk if it has not run yet.
    pub fn run(&self) {
        // Take first so a re-entrant call sees `None`.
        let thunk = self.thunk.lock().take();
        if let Some(thunk) = thunk {
            thunk();
        }
    }

    /// Whether the thunk has already run.
    pub fn is_spent(&self) -> bool {
        self.thunk.lock().is_none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("spent", &self.is_spent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn cleanup_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cleanup = Cleanup::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        cleanup.run();
        cleanup.clone().run();
        cleanup.run();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cleanup.is_spent());
    }
}
