//! Reactive Primitives
//!
//! This module implements the reactive dependency engine: cells, fragments,
//! and the runtime that collects invalidated fragments into batches.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. When a cell is read inside a
//! tracking scope, the fragment being evaluated becomes one of its
//! dependents. When the value changes, every dependent is marked stale.
//!
//! ## Fragments
//!
//! A Fragment is a unit of rendered markup. Tracked fragments keep their
//! render closure and recompute lazily: a write only schedules the work,
//! the next serialization performs it.
//!
//! ## Runtime
//!
//! The Runtime owns everything process-wide: the stale set, the backlog of
//! consolidated batches, the mutation handler registry and the session
//! token. It is passed explicitly, so independent runtimes can coexist.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local scope stack. Render closures run
//! synchronously, so the scope that is active when a cell is read always
//! belongs to the fragment currently being evaluated.
//!
//! Edges from cells to fragments are `Weak`. A fragment superseded by a
//! later render pass is freed once no markup holds it; any edge still
//! pointing at it is pruned the next time it is visited.

mod ids;
mod context;
mod cell;
mod fragment;
mod runtime;

pub use ids::{CellId, FragmentId};
pub use context::TrackingScope;
pub use cell::Cell;
pub use fragment::{Address, Fragment, FragmentState, Index, Key, Markup, RenderFn, Segment};
pub use runtime::{Callback, Handler, Runtime};
