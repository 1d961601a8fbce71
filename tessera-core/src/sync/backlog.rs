//! Backlog
//!
//! A bounded ring of consolidated batches addressed by a monotonic cursor.
//!
//! The batch at ring position `p` has absolute sequence number
//! `offset + p`, where `offset` counts the batches evicted so far. The tip
//! of the cursor space is `offset + len`. A cursor `C` can be served in full
//! iff `offset <= C <= tip`; anything else tells the client to reload.

use std::collections::VecDeque;
use std::sync::Arc;

use super::protocol::Update;

/// Result of replaying the backlog from a cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    /// The cursor is outside the retained window.
    Reload,

    /// Every update from the cursor to `tip`, in batch order. Empty when
    /// the cursor is already at the tip.
    Updates { tip: u64, updates: Vec<Update> },
}

/// Bounded history of batches.
#[derive(Debug)]
pub struct Backlog {
    batches: VecDeque<Arc<[Update]>>,
    offset: u64,
    capacity: usize,
}

impl Backlog {
    /// Create an empty backlog retaining at most `capacity` batches.
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: VecDeque::new(),
            offset: 0,
            capacity: capacity.max(1),
        }
    }

    /// Number of batches evicted so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tip(&self) -> u64 {
        self.offset + self.batches.len() as u64
    }

    /// Append a batch, evicting the oldest one when over capacity.
    ///
    /// Returns the new tip.
    pub fn append(&mut self, updates: Vec<Update>) -> u64 {
        self.batches.push_back(Arc::from(updates));
        while self.batches.len() > self.capacity {
            self.batches.pop_front();
            self.offset += 1;
        }
        self.tip()
    }

    /// Whether `cursor` lies inside the retained window.
    pub fn contains(&self, cursor: u64) -> bool {
        self.offset <= cursor && cursor <= self.tip()
    }

    /// Concatenate every batch from `cursor` onwards.
    pub fn replay(&self, cursor: u64) -> Replay {
        if !self.contains(cursor) {
            return Replay::Reload;
        }

        let start = (cursor - self.offset) as usize;
        let updates = self
            .batches
            .iter()
            .skip(start)
            .flat_map(|batch| batch.iter().cloned())
            .collect();

        Replay::Updates {
            tip: self.tip(),
            updates,
        }
    }
}
