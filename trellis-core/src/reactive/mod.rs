//! Reactive Primitives
//!
//! This module implements the observable engine: observables, the update
//! scheduler, ownership scopes and keyed stores.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] is a mutable cell with change notification. Root
//! observables are written directly; derived observables are computed from
//! fixed parents and refuse external writes.
//!
//! ## Scheduler
//!
//! Writes are batched by default. The [`Scheduler`] collects observables
//! with pending notifications and flushes them once per microtask, or
//! immediately on [`Scheduler::flush_sync`]. Several writes in one tick
//! coalesce into one notification carrying the last value.
//!
//! ## Owners
//!
//! An [`Owner`] collects the observables and cleanups created inside it so
//! they can be torn down together.
//!
//! # Implementation Notes
//!
//! Dependencies are explicit: a derived observable names its parents at
//! construction. That is what lets the graph codec number the whole graph
//! and the hydration reconciler walk from any bound observable back to the
//! roots whose values were transmitted.

mod observable;
mod owner;
mod runtime;
mod scheduler;
mod store;
mod subscriber;
mod value;

pub use observable::{AnyObservable, Derivation, Observable, Parents};
pub use owner::Owner;
pub use runtime::{ErrorSink, Runtime};
pub use scheduler::{Microtask, MicrotaskHook, Notify, Scheduler};
pub use store::{Store, StoreEntry};
pub use subscriber::{Cleanup, SubscriberId};
pub use value::{ReactiveValue, SameValue, Value};
