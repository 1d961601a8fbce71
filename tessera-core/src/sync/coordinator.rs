//! Sync Coordinator
//!
//! Gates access to the backlog and lets long-poll requests suspend until
//! the next flush.
//!
//! # Algorithm
//!
//! The current tip is published on a `tokio::sync::watch` channel. A
//! caught-up waiter subscribes and waits for the tip to move past its
//! cursor; a flush appends its batch and publishes the new tip, which
//! releases every waiter at once. Each waiter then replays the backlog for
//! its own cursor.
//!
//! The tip is published while the backlog lock is held, so the value seen
//! on the channel never decreases even with concurrent flushes. A waiter
//! that is dropped (its connection closed) simply drops its receiver.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::backlog::{Backlog, Replay};
use super::protocol::Update;

pub struct Coordinator {
    backlog: Mutex<Backlog>,
    tip: watch::Sender<u64>,
}

impl Coordinator {
    pub fn new(backlog_len: usize) -> Self {
        let (tip, _) = watch::channel(0);
        Self {
            backlog: Mutex::new(Backlog::new(backlog_len)),
            tip,
        }
    }

    pub fn tip(&self) -> u64 {
        self.backlog.lock().tip()
    }

    pub fn offset(&self) -> u64 {
        self.backlog.lock().offset()
    }

    /// Append a batch and wake every waiter. Returns the new tip.
    pub fn publish(&self, updates: Vec<Update>) -> u64 {
        let mut backlog = self.backlog.lock();
        let before = backlog.offset();
        let tip = backlog.append(updates);
        let evicted = backlog.offset() - before;
        self.tip.send_replace(tip);
        drop(backlog);

        if evicted > 0 {
            tracing::debug!(tip, evicted, "backlog evicted oldest batch");
        }
        tip
    }

    pub fn replay(&self, cursor: u64) -> Replay {
        self.backlog.lock().replay(cursor)
    }

    /// Number of requests currently suspended in [`Coordinator::wait_past`].
    pub fn waiter_count(&self) -> usize {
        self.tip.receiver_count()
    }

    /// Suspend until the tip exceeds `cursor` or `timeout` elapses.
    ///
    /// Returns `true` when a new batch is available.
    pub async fn wait_past(&self, cursor: u64, timeout: Duration) -> bool {
        let mut receiver = self.tip.subscribe();
        let released = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|tip| *tip > cursor)).await,
            Ok(Ok(_))
        );
        released
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("backlog", &*self.backlog.lock())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Index, Key};
    use std::sync::Arc;

    fn update(html: &str) -> Update {
        Update::new(Key::from("k"), Index::Position(0), html)
    }

    #[test]
    fn publish_advances_tip() {
        let coordinator = Coordinator::new(5);
        assert_eq!(coordinator.publish(vec![update("a")]), 1);
        assert_eq!(coordinator.publish(vec![update("b")]), 2);
        assert_eq!(coordinator.tip(), 2);
    }

    #[test]
    fn publish_past_capacity_moves_offset() {
        let coordinator = Coordinator::new(2);
        for html in ["a", "b", "c"] {
            coordinator.publish(vec![update(html)]);
        }
        assert_eq!(coordinator.offset(), 1);
        assert_eq!(coordinator.tip(), 3);
        assert_eq!(coordinator.replay(0), Replay::Reload);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_immediately_when_behind() {
        let coordinator = Coordinator::new(5);
        coordinator.publish(vec![update("a")]);
        assert!(coordinator.wait_past(0, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_when_caught_up() {
        let coordinator = Coordinator::new(5);
        assert!(!coordinator.wait_past(0, Duration::from_secs(30)).await);
        assert_eq!(coordinator.waiter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_releases_all_waiters() {
        let coordinator = Arc::new(Coordinator::new(5));

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let coordinator = Arc::clone(&coordinator);
            waiters.push(tokio::spawn(async move {
                coordinator.wait_past(0, Duration::from_secs(60)).await
            }));
        }
        tokio::task::yield_now().await;

        coordinator.publish(vec![update("a")]);
        for waiter in waiters {
            assert!(waiter.await.expect("waiter task"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_waiter_leaves_others_intact() {
        let coordinator = Arc::new(Coordinator::new(5));

        let abandoned = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_past(0, Duration::from_secs(60)).await })
        };
        let kept = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_past(0, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;

        abandoned.abort();
        assert!(abandoned.await.is_err());

        coordinator.publish(vec![update("a")]);
        assert!(kept.await.expect("waiter task"));
    }
}
