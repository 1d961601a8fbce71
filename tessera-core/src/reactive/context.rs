//! Dependency Tracker
//!
//! The tracker records which cells are read while a fragment's render
//! closure runs. When the closure returns, every recorded cell registers the
//! produced fragment as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack of scopes. Entering the evaluation of a
//! recomputable fragment pushes a fresh, empty read set; a cell read while
//! the stack is non-empty adds itself to the top set only. When the
//! evaluation completes the set is popped and handed back to the caller.
//!
//! A render closure may itself invoke other tracked renders. Each of those
//! pushes and pops its own scope, so nested reads are attributed to their
//! immediate fragment and never leak into an ancestor's read set.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use super::cell::Dependency;

/// Cells read during a single evaluation, in first-read order.
pub(crate) type Reads = SmallVec<[Arc<dyn Dependency>; 4]>;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = RefCell::new(Vec::new());
}

struct ScopeEntry {
    /// Token matching the guard that pushed this entry.
    token: u64,
    reads: Reads,
}

fn next_token() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Guard for an active tracking scope.
///
/// The scope is popped by [`TrackingScope::finish`], or by `Drop` if the
/// render closure panics before finishing.
pub struct TrackingScope {
    token: u64,
    finished: bool,
}

impl TrackingScope {
    /// Push a new empty read set onto this thread's stack.
    pub fn enter() -> Self {
        let token = next_token();
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                token,
                reads: SmallVec::new(),
            });
        });
        tracing::trace!(token, "tracking scope entered");

        Self {
            token,
            finished: false,
        }
    }

    /// Check if there is an active tracking scope on this thread.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Current nesting depth.
    pub fn depth() -> usize {
        SCOPE_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read in the innermost scope.
    ///
    /// `dependency` is only invoked when a scope is active, so untracked
    /// reads never clone the cell handle. Repeated reads of the same cell
    /// are recorded once.
    pub(crate) fn record<F>(dependency: F)
    where
        F: FnOnce() -> Arc<dyn Dependency>,
    {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(entry) = stack.last_mut() {
                let dependency = dependency();
                let id = dependency.cell_id();
                if !entry.reads.iter().any(|d| d.cell_id() == id) {
                    entry.reads.push(dependency);
                }
            }
        });
    }

    /// Pop this scope and return the cells that were read in it.
    pub(crate) fn finish(mut self) -> Reads {
        self.finished = true;
        self.pop()
    }

    fn pop(&self) -> Reads {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            match popped {
                Some(entry) => {
                    debug_assert_eq!(
                        entry.token, self.token,
                        "TrackingScope mismatch: expected {}, got {}",
                        self.token, entry.token
                    );
                    tracing::trace!(token = self.token, reads = entry.reads.len(), "tracking scope finished");
                    entry.reads
                }
                None => SmallVec::new(),
            }
        })
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;

    #[test]
    fn scope_is_active_only_while_held() {
        assert!(!TrackingScope::is_active());

        {
            let _scope = TrackingScope::enter();
            assert!(TrackingScope::is_active());
            assert_eq!(TrackingScope::depth(), 1);
        }

        // Scope should be cleaned up after drop
        assert!(!TrackingScope::is_active());
    }

    #[test]
    fn scope_records_each_cell_once() {
        let a = Cell::new(1);
        let b = Cell::new(2);

        let scope = TrackingScope::enter();
        a.get();
        b.get();
        a.get();
        let reads = scope.finish();

        let ids: Vec<_> = reads.iter().map(|d| d.cell_id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn nested_reads_belong_to_inner_scope() {
        let outer_cell = Cell::new("outer");
        let inner_cell = Cell::new("inner");

        let outer = TrackingScope::enter();
        outer_cell.get();

        let inner = TrackingScope::enter();
        inner_cell.get();
        let inner_reads = inner.finish();

        let outer_reads = outer.finish();

        assert_eq!(inner_reads.len(), 1);
        assert_eq!(inner_reads[0].cell_id(), inner_cell.id());
        assert_eq!(outer_reads.len(), 1);
        assert_eq!(outer_reads[0].cell_id(), outer_cell.id());
    }

    #[test]
    fn reads_outside_scope_are_not_recorded() {
        let cell = Cell::new(0);
        cell.get();

        let scope = TrackingScope::enter();
        let reads = scope.finish();
        assert!(reads.is_empty());
    }
}
