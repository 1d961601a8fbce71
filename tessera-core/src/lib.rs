//! Tessera Core
//!
//! This crate provides the core runtime for Tessera, which keeps live,
//! fine-grained fragments of server-rendered markup and pushes only the
//! fragments that changed to connected clients over long-poll.
//! It implements:
//!
//! - Reactive primitives (cells, lazily recomputed fragments)
//! - Keyed markup assembly that gives each fragment a client-side address
//! - A bounded backlog of consolidated change batches and a long-poll
//!   coordinator
//! - Wire types for the mutate, sync and log operations
//!
//! The HTTP layer that exposes these operations and the client script that
//! applies patches are external collaborators.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Cells, fragments, dependency tracking and the runtime
//! - `markup`: Element builders and the keying rules
//! - `sync`: Backlog, long-poll coordinator, session and wire protocol
//! - `page`: Full page render with client bootstrap
//! - `config`: Runtime configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_core::markup::tags::div;
//! use tessera_core::reactive::{Cell, Runtime};
//! use tessera_core::sync::protocol::PollRequest;
//!
//! let runtime = Runtime::default();
//! let value = Cell::new(String::from("str"));
//!
//! // A tracked fragment inside a container gets the container's key.
//! let source = value.clone();
//! let page = div().child(runtime.track(move || source.get())).build();
//!
//! // A write only marks the fragment stale...
//! value.set(String::from("new str"));
//!
//! // ...the next poll consolidates it into a batch.
//! let response = runtime.poll(PollRequest { state: 0, session: None }).await;
//! // {"state": 1, "updates": [[key, 0, "new str"]], ...}
//! ```

pub mod config;
pub mod error;
pub mod markup;
pub mod page;
pub mod reactive;
pub mod sync;

pub use config::{Config, Endpoints};
pub use error::{BoxError, Error, HandlerResult, Result};
pub use page::{Page, PageOptions};
pub use reactive::{Callback, Cell, Fragment, Markup, Runtime};
