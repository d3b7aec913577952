//! Delivery counters shared by the event bus and the subscription manager.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of delivery statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events accepted onto a queue.
    pub published: u64,
    /// Events discarded because no queue existed or the queue was full.
    pub dropped: u64,
    /// Individual payload hand-offs to subscriber channels.
    pub delivered: u64,
    /// Sends abandoned because the delivery timeout elapsed.
    pub timed_out: u64,
    /// Panics caught while fanning an event out.
    pub panicked: u64,
}

/// Internal counters for delivery statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub published: AtomicU64,
    pub dropped: AtomicU64,
    pub delivered: AtomicU64,
    pub timed_out: AtomicU64,
    pub panicked: AtomicU64,
}

impl DeliveryCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
