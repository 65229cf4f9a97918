//! # Offline Queue
//!
//! Ordered buffer of mutations accumulated while the gateway is unreachable.
//!
//! ## Features
//!
//! - **FIFO Order**: Insertion order is preserved; replay never reorders
//! - **No Deduplication**: Duplicate item ids stay; the merge layer decides
//!   the effective value (last write in the list wins)
//! - **Safe Replay**: A drain snapshots the queue; entries are removed only
//!   after the replay succeeded, so a failed replay leaves the queue intact

use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::shared::progress::PendingUpdate;

/// FIFO queue of pending updates awaiting transmission
#[derive(Debug, Default)]
pub struct OfflineQueue {
    updates: RwLock<VecDeque<PendingUpdate>>,
}

/// How a drain should replay the queued updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainPlan {
    /// Nothing queued
    Empty,
    /// Exactly one update: replay as a single save
    Single(PendingUpdate),
    /// Multiple updates: replay as one ordered batch
    Batch(Vec<PendingUpdate>),
}

/// Queue statistics for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of queued updates
    pub queued: usize,
    /// Timestamp of the oldest queued update
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
}

impl OfflineQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            updates: RwLock::new(VecDeque::new()),
        }
    }

    /// Append an update to the back of the queue
    pub async fn enqueue(&self, update: PendingUpdate) {
        let mut updates = self.updates.write().await;
        updates.push_back(update);
        tracing::debug!("[Engine] Queued update, {} pending", updates.len());
    }

    /// Number of queued updates
    pub async fn len(&self) -> usize {
        self.updates.read().await.len()
    }

    /// True when nothing is queued
    pub async fn is_empty(&self) -> bool {
        self.updates.read().await.is_empty()
    }

    /// Snapshot the queue contents in order
    pub async fn snapshot(&self) -> Vec<PendingUpdate> {
        self.updates.read().await.iter().cloned().collect()
    }

    /// Decide how a drain should replay the current contents
    ///
    /// The plan is a snapshot; the queue itself is untouched until
    /// [`OfflineQueue::remove_first`] confirms the replay.
    pub async fn drain_plan(&self) -> DrainPlan {
        let updates = self.updates.read().await;
        match updates.len() {
            0 => DrainPlan::Empty,
            1 => DrainPlan::Single(updates[0].clone()),
            _ => DrainPlan::Batch(updates.iter().cloned().collect()),
        }
    }

    /// Remove the first `count` entries after a successful replay
    ///
    /// Updates appended while the replay was in flight stay queued for the
    /// next drain.
    pub async fn remove_first(&self, count: usize) -> usize {
        let mut updates = self.updates.write().await;
        let removed = count.min(updates.len());
        updates.drain(..removed);
        removed
    }

    /// Queue statistics
    pub async fn stats(&self) -> QueueStats {
        let updates = self.updates.read().await;
        QueueStats {
            queued: updates.len(),
            oldest: updates.front().map(|u| u.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::progress::PendingUpdate;

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let queue = OfflineQueue::new();
        queue.enqueue(PendingUpdate::add_to_path("a", true)).await;
        queue.enqueue(PendingUpdate::add_to_path("b", true)).await;
        queue.enqueue(PendingUpdate::add_to_path("c", true)).await;

        let snapshot = queue.snapshot().await;
        let ids: Vec<&str> = snapshot.iter().map(|u| u.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_drain_plan_single_vs_batch() {
        let queue = OfflineQueue::new();
        assert_eq!(queue.drain_plan().await, DrainPlan::Empty);

        queue.enqueue(PendingUpdate::add_to_path("a", true)).await;
        assert!(matches!(queue.drain_plan().await, DrainPlan::Single(_)));

        queue.enqueue(PendingUpdate::mark_completed("a", true)).await;
        match queue.drain_plan().await {
            DrainPlan::Batch(updates) => assert_eq!(updates.len(), 2),
            other => panic!("expected batch plan, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plan_leaves_queue_intact() {
        let queue = OfflineQueue::new();
        queue.enqueue(PendingUpdate::add_to_path("a", true)).await;
        queue.enqueue(PendingUpdate::add_to_path("b", true)).await;

        let _ = queue.drain_plan().await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_first_keeps_late_arrivals() {
        let queue = OfflineQueue::new();
        queue.enqueue(PendingUpdate::add_to_path("a", true)).await;
        queue.enqueue(PendingUpdate::add_to_path("b", true)).await;

        // A third update lands while the first two are being replayed
        queue.enqueue(PendingUpdate::add_to_path("c", true)).await;
        let removed = queue.remove_first(2).await;

        assert_eq!(removed, 2);
        let remaining = queue.snapshot().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].item_id, "c");
    }

    #[tokio::test]
    async fn test_duplicate_item_ids_are_kept() {
        let queue = OfflineQueue::new();
        queue.enqueue(PendingUpdate::add_to_path("a", true)).await;
        queue.enqueue(PendingUpdate::add_to_path("a", false)).await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_stats_report_oldest() {
        let queue = OfflineQueue::new();
        assert_eq!(queue.stats().await.oldest, None);

        let first = PendingUpdate::add_to_path("a", true);
        let first_ts = first.timestamp;
        queue.enqueue(first).await;
        queue.enqueue(PendingUpdate::add_to_path("b", true)).await;

        let stats = queue.stats().await;
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.oldest, Some(first_ts));
    }
}
