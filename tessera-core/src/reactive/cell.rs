//! Cell Implementation
//!
//! A Cell is the mutable reactive value store. It holds a value and the set
//! of fragments whose last evaluation read it.
//!
//! # How Cells Work
//!
//! 1. When a cell is read inside a tracking scope, the scope records the
//!    cell. Once the fragment being evaluated exists, the cell stores a weak
//!    handle to it.
//!
//! 2. When the value changes, every dependent that is still alive is marked
//!    stale. Nothing is recomputed and nothing is pushed to clients: that
//!    happens at the next flush, so a burst of writes collapses into one
//!    batch.
//!
//! 3. Marking a dependent stale removes it from the dependent set. The
//!    fragment registers again when it is recomputed, and a recompute that
//!    no longer reads a cell removes itself from that cell, so the set
//!    always reflects the last successful evaluation.
//!
//! # Memory
//!
//! Dependents are held as `Weak` references. A cell never keeps a
//! superseded fragment alive; dead handles are pruned lazily.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::TrackingScope;
use super::fragment::FragmentNode;
use super::ids::{CellId, FragmentId};

/// Type-erased view of a cell, used by the tracker to register dependents
/// without knowing the cell's value type.
pub(crate) trait Dependency: Send + Sync {
    fn cell_id(&self) -> CellId;

    /// Register `fragment` as a dependent. Registering the same fragment
    /// twice is a no-op.
    fn add_dependent(&self, id: FragmentId, fragment: Weak<FragmentNode>);

    /// Drop the edge to fragment `id`, if any.
    fn remove_dependent(&self, id: FragmentId);
}

struct CellInner<T> {
    id: CellId,
    value: RwLock<T>,
    dependents: Mutex<Vec<(FragmentId, Weak<FragmentNode>)>>,
}

impl<T> Dependency for CellInner<T>
where
    T: Send + Sync + 'static,
{
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn add_dependent(&self, id: FragmentId, fragment: Weak<FragmentNode>) {
        let mut dependents = self.dependents.lock();
        dependents.retain(|(_, weak)| weak.strong_count() > 0);
        if !dependents.iter().any(|(existing, _)| *existing == id) {
            dependents.push((id, fragment));
        }
    }

    fn remove_dependent(&self, id: FragmentId) {
        self.dependents
            .lock()
            .retain(|(existing, weak)| *existing != id && weak.strong_count() > 0);
    }
}

/// A reactive mutable value.
///
/// Cloning a cell yields another handle to the same value.
///
/// # Example
///
/// ```rust,ignore
/// let name = Cell::new(String::from("str"));
///
/// let label = runtime.track({
///     let name = name.clone();
///     move || name.get()
/// });
///
/// // Marks `label` stale; the next flush re-renders it.
/// name.set(String::from("new str"));
/// ```
pub struct Cell<T>
where
    T: Send + Sync + 'static,
{
    inner: Arc<CellInner<T>>,
}

impl<T> Cell<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: CellId::new(),
                value: RwLock::new(value),
                dependents: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Read the value through a closure.
    ///
    /// Inside a tracking scope this registers the read, exactly like
    /// [`Cell::get`].
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.track();
        let guard = self.inner.value.read();
        f(&guard)
    }

    /// Read the value without registering a dependency.
    pub fn with_untracked<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.value.read();
        f(&guard)
    }

    /// Store a value unconditionally, treating it as changed.
    ///
    /// This is the write path for values with no meaningful equality.
    pub fn replace(&self, value: T) {
        *self.inner.value.write() = value;
        self.invalidate();
    }

    /// Number of live dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner
            .dependents
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    fn track(&self) {
        if TrackingScope::is_active() {
            TrackingScope::record(|| Arc::clone(&self.inner) as Arc<dyn Dependency>);
        }
    }

    /// Mark every live dependent stale and clear the dependent set.
    fn invalidate(&self) {
        let dependents = std::mem::take(&mut *self.inner.dependents.lock());

        let mut marked = 0usize;
        for (_, weak) in dependents {
            if let Some(node) = weak.upgrade() {
                node.mark_stale();
                marked += 1;
            }
        }
        tracing::trace!(cell = self.inner.id.raw(), marked, "cell invalidated dependents");
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the current value, registering a dependency when called inside
    /// a tracking scope.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T> Cell<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Set a new value.
    ///
    /// Writing a value equal to the current one is a no-op. Values that do
    /// not compare equal to themselves (such as `f64::NAN`) always count as
    /// a change.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.invalidate();
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }
}

impl<T> Clone for Cell<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_untracked(|value| {
            f.debug_struct("Cell")
                .field("id", &self.inner.id)
                .field("value", value)
                .field("dependent_count", &self.dependent_count())
                .finish()
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
