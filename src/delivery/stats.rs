//! Delivery counters exposed to the surrounding shell.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::queue::EventQueue;

/// Counters written by the batch sender and read by anyone.
///
/// `held` counts events the sender owns outside the queue: the persisted
/// pending set, or the working set while a cycle is in flight.
#[derive(Debug, Default)]
pub struct StatsTracker {
    delivered: AtomicU64,
    held: AtomicU64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully delivered chunk.
    pub fn record_delivered(&self, count: u64) {
        self.delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Set the number of events held by the sender.
    pub fn set_held(&self, count: u64) {
        self.held.store(count, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn held(&self) -> u64 {
        self.held.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters; `queue` supplies the not-yet-drained count.
    pub fn snapshot(&self, queue: &EventQueue) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered(),
            pending: self.held().saturating_add(queue.len() as u64),
        }
    }
}

/// Point-in-time delivery statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub pending: u64,
}

impl std::fmt::Display for DeliveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sent: {}, pending: {}", self.delivered, self.pending)
    }
}

/// Thread-safe shared stats tracker.
pub type SharedStats = Arc<StatsTracker>;
