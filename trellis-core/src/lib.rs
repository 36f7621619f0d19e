//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive DOM
//! framework. It implements:
//!
//! - Observables with explicit dependencies and batched notification
//! - A numeric dependency-graph encoding that travels with server markup
//! - Server rendering and client hydration over a shared render context
//! - Marker-bounded fragments and keyed list reconciliation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: observables, scheduler, owners and keyed stores
//! - `graph`: dependency graph encoding, path search and validation
//! - `dom`: in-memory document, fragments, element builder, keyed lists
//! - `hydration`: render context, payload, reconciler and SSR entry points
//! - `config`: runtime configuration
//!
//! # Example
//!
//! ```rust
//! use trellis_core::dom::{ElementBuilder, View};
//! use trellis_core::hydration::{hydrate, SsrRenderer};
//! use trellis_core::reactive::Observable;
//! use trellis_core::{Document, RuntimeConfig};
//!
//! fn counter(doc: &Document, start: i64) -> trellis_core::Result<(Observable<i64>, View)> {
//!     let count = Observable::new(start);
//!     let label = count.derive(|n| format!("Count: {n}"));
//!     let node = ElementBuilder::new("p").text(&label).build(doc)?;
//!     Ok((count, View::Node(node)))
//! }
//!
//! // Server: render with the real value.
//! let output = SsrRenderer::default()
//!     .render(|doc| counter(doc, 42).map(|(_, view)| view))
//!     .unwrap();
//!
//! // Client: same component, default value, server markup.
//! let page = Document::from_html(&output.html).unwrap();
//! let ((count, _), report) = hydrate(
//!     &page,
//!     page.root(),
//!     output.payload,
//!     RuntimeConfig::default(),
//!     |doc| counter(doc, 0).unwrap(),
//! );
//! assert!(report.is_clean());
//! assert_eq!(count.get(), 42);
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod graph;
pub mod hydration;
pub mod reactive;

pub use config::RuntimeConfig;
pub use dom::Document;
pub use error::{Error, Result};
