//! Reactive Runtime
//!
//! Process-wide hooks shared by every observable. Right now that is the
//! error sink: where failures that must never propagate (a cleanup that
//! errors or panics inside `destroy`) are reported.
//!
//! The sink defaults to logging through `tracing::error!`. Tests and hosts
//! can install their own to count or forward failures.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Receives errors that are reported instead of propagated.
pub type ErrorSink = Arc<dyn Fn(&Error) + Send + Sync>;

/// The reactive runtime.
pub struct Runtime;

static ERROR_SINK: OnceLock<RwLock<Option<ErrorSink>>> = OnceLock::new();

fn get_sink() -> &'static RwLock<Option<ErrorSink>> {
    ERROR_SINK.get_or_init(|| RwLock::new(None))
}

thread_local! {
    /// Scoped overrides installed by [`Runtime::with_error_sink`].
    static SCOPED_SINKS: RefCell<Vec<ErrorSink>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Install a custom error sink, returning the previous one.
    pub fn set_error_sink(sink: ErrorSink) -> Option<ErrorSink> {
        get_sink().write().replace(sink)
    }

    /// Restore the default logging sink.
    pub fn reset_error_sink() {
        *get_sink().write() = None;
    }

    /// Run `f` with `sink` receiving every report made on this thread.
    ///
    /// Scoped sinks take precedence over the process-wide one and nest.
    pub fn with_error_sink<R>(sink: ErrorSink, f: impl FnOnce() -> R) -> R {
        struct PopGuard;
        impl Drop for PopGuard {
            fn drop(&mut self) {
                SCOPED_SINKS.with(|s| s.borrow_mut().pop());
            }
        }

        SCOPED_SINKS.with(|s| s.borrow_mut().push(sink));
        let _guard = PopGuard;
        f()
    }

    /// Report an error to the installed sink.
    pub fn report(error: &Error) {
        // Clone out so the sink can itself install or remove sinks.
        let sink = SCOPED_SINKS
            .with(|s| s.borrow().last().cloned())
            .or_else(|| get_sink().read().clone());
        match sink {
            Some(sink) => sink(error),
            None => tracing::error!(%error, "reactive runtime error"),
        }
    }

    /// Run a fallible thunk, reporting an `Err` or a panic instead of
    /// propagating it.
    ///
    /// Returns `true` when the thunk completed with `Ok`.
    pub fn isolate<F>(f: F) -> bool
    where
        F: FnOnce() -> Result<()>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                Self::report(&error);
                false
            }
            Err(payload) => {
                Self::report(&Error::Cleanup(panic_message(payload.as_ref())));
                false
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
