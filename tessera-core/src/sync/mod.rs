//! Update Distribution
//!
//! This module turns consolidated batches into something clients can
//! follow without a persistent connection.
//!
//! # Overview
//!
//! - [`Backlog`] keeps the last `W` batches. Each batch has an absolute
//!   sequence number; the tip of the cursor space only ever grows.
//! - [`Coordinator`] wraps the backlog with the wait/notify channel that
//!   long-poll requests suspend on.
//! - [`protocol`] defines the request/response bodies and their encodings.
//! - [`SessionId`] invalidates every cursor across a process restart.
//!
//! A client that falls further behind than the retained window, or that
//! presents a cursor from another session, is told to reload rather than
//! receiving a partial history.

mod backlog;
mod coordinator;
pub mod protocol;
mod session;

pub use backlog::{Backlog, Replay};
pub use coordinator::Coordinator;
pub use session::SessionId;
