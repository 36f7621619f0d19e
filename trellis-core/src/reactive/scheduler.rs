//! Update Scheduler
//!
//! Batches observable notifications. A write enqueues the observable into a
//! per-thread pending set; the first write after a flush also queues one
//! deferred flush on the microtask hook.
//!
//! # Flush
//!
//! The flush loop repeatedly snapshots the pending set and notifies each
//! member. Notifying one observable may synchronously schedule another (a
//! derived value recomputing, an observer writing elsewhere), so the loop
//! keeps re-snapshotting until the set is empty. Each observable reads its
//! value at notification time, so several writes in one tick coalesce into
//! one notification carrying the last value.
//!
//! # Microtasks
//!
//! There is no browser event loop here. By default the deferred flush goes
//! into a per-thread queue that the host drains with
//! [`Scheduler::run_microtasks`] at the end of each turn. Hosts running a
//! tokio `LocalSet` can route it through `spawn_local` instead with
//! [`Scheduler::use_tokio_local`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use super::runtime::{panic_message, Runtime};
use crate::error::Error;

/// Something the scheduler can deliver a pending notification to.
pub trait Notify: Send + Sync {
    /// Key used to coalesce repeated schedules of the same target.
    fn notify_key(&self) -> u64;

    /// Deliver the current value to every live observer.
    fn notify_observers(&self);
}

/// A deferred unit of work.
pub type Microtask = Box<dyn FnOnce()>;

/// Where deferred flushes are queued.
pub type MicrotaskHook = Rc<dyn Fn(Microtask)>;

#[derive(Default)]
struct SchedulerState {
    pending: IndexMap<u64, Arc<dyn Notify>>,
    flush_queued: bool,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
    static MICROTASKS: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
    static HOOK: RefCell<Option<MicrotaskHook>> = const { RefCell::new(None) };
}

/// The per-thread update scheduler.
pub struct Scheduler;

impl Scheduler {
    /// Add `target` to the pending set, queueing a flush if none is queued.
    pub fn schedule_update(target: Arc<dyn Notify>) {
        let needs_flush = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.pending.insert(target.notify_key(), target);
            !std::mem::replace(&mut state.flush_queued, true)
        });

        if needs_flush {
            queue_microtask(Box::new(|| {
                STATE.with(|state| state.borrow_mut().flush_queued = false);
                Scheduler::drain();
            }));
        }
    }

    /// Drain the pending set now.
    ///
    /// Called from inside an observer during a flush this returns at once;
    /// the outer flush loop picks up whatever was scheduled.
    pub fn flush_sync() {
        Self::drain();
    }

    /// Number of observables waiting for a flush on this thread.
    pub fn pending_count() -> usize {
        STATE.with(|state| state.borrow().pending.len())
    }

    /// Whether a deferred flush is queued and has not run yet.
    pub fn is_flush_queued() -> bool {
        STATE.with(|state| state.borrow().flush_queued)
    }

    /// Run every queued microtask, including ones queued while running.
    ///
    /// Returns the number of microtasks run.
    pub fn run_microtasks() -> usize {
        let mut ran = 0;
        while let Some(task) = MICROTASKS.with(|q| q.borrow_mut().pop_front()) {
            task();
            ran += 1;
        }
        ran
    }

    /// Replace the microtask hook for this thread. `None` restores the
    /// default queue drained by [`Scheduler::run_microtasks`].
    pub fn set_microtask_hook(hook: Option<MicrotaskHook>) {
        HOOK.with(|h| *h.borrow_mut() = hook);
    }

    /// Route deferred flushes through `tokio::task::spawn_local`.
    ///
    /// Writes must then happen inside a `LocalSet`.
    pub fn use_tokio_local() {
        Self::set_microtask_hook(Some(Rc::new(|task: Microtask| {
            tokio::task::spawn_local(async move { task() });
        })));
    }

    fn drain() {
        if FLUSHING.with(|f| f.replace(true)) {
            return;
        }

        struct ResetGuard;
        impl Drop for ResetGuard {
            fn drop(&mut self) {
                FLUSHING.with(|f| f.set(false));
            }
        }
        let _guard = ResetGuard;

        let mut rounds = 0usize;
        loop {
            let batch: Vec<Arc<dyn Notify>> = STATE.with(|state| {
                state.borrow_mut().pending.drain(..).map(|(_, t)| t).collect()
            });
            if batch.is_empty() {
                break;
            }
            rounds += 1;
            tracing::trace!(round = rounds, size = batch.len(), "flushing observables");
            for target in batch {
                // A panicking observer is reported; the rest of the batch still runs.
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| target.notify_observers())) {
                    Runtime::report(&Error::Observer(panic_message(payload.as_ref())));
                }
            }
        }
    }
}

fn queue_microtask(task: Microtask) {
    let hook = HOOK.with(|h| h.borrow().clone());
    match hook {
        Some(hook) => hook(task),
        None => MICROTASKS.with(|q| q.borrow_mut().push_back(task)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        key: u64,
        hits: AtomicUsize,
        chain: Mutex<Option<Arc<Probe>>>,
    }

    impl Probe {
        fn new(key: u64) -> Arc<Self> {
            Arc::new(Self {
                key,
                hits: AtomicUsize::new(0),
                chain: Mutex::new(None),
            })
        }
    }

    impl Notify for Probe {
        fn notify_key(&self) -> u64 {
            self.key
        }

        fn notify_observers(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.chain.lock().take() {
                Scheduler::schedule_update(next);
            }
        }
    }

    #[test]
    fn schedules_coalesce_until_microtasks_run() {
        let probe = Probe::new(u64::MAX - 1);
        Scheduler::schedule_update(probe.clone());
        Scheduler::schedule_update(probe.clone());
        Scheduler::schedule_update(probe.clone());

        assert_eq!(Scheduler::pending_count(), 1);
        assert!(Scheduler::is_flush_queued());
        assert_eq!(probe.hits.load(Ordering::SeqCst), 0);

        assert_eq!(Scheduler::run_microtasks(), 1);
        assert_eq!(probe.hits.load(Ordering::SeqCst), 1);
        assert!(!Scheduler::is_flush_queued());
    }

    struct Bomb;

    impl Notify for Bomb {
        fn notify_key(&self) -> u64 {
            u64::MAX - 4
        }

        fn notify_observers(&self) {
            panic!("observer failed");
        }
    }

    #[test]
    fn panicking_observer_does_not_drop_the_batch() {
        let after = Probe::new(u64::MAX - 5);
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);

        Runtime::with_error_sink(
            Arc::new(move |err: &Error| sink.lock().push(err.to_string())),
            || {
                Scheduler::schedule_update(Arc::new(Bomb));
                Scheduler::schedule_update(after.clone());
                Scheduler::flush_sync();
            },
        );

        assert_eq!(after.hits.load(Ordering::SeqCst), 1);
        assert_eq!(*reported.lock(), vec!["observer panicked: observer failed".to_string()]);
        assert_eq!(Scheduler::pending_count(), 0);
    }

    #[test]
    fn cascading_schedules_settle_in_one_flush() {
        let first = Probe::new(u64::MAX - 2);
        let second = Probe::new(u64::MAX - 3);
        *first.chain.lock() = Some(second.clone());

        Scheduler::schedule_update(first.clone());
        Scheduler::flush_sync();

        assert_eq!(first.hits.load(Ordering::SeqCst), 1);
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
        assert_eq!(Scheduler::pending_count(), 0);

        // The queued microtask still runs but finds nothing to do.
        Scheduler::run_microtasks();
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
    }
}
