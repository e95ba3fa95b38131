//! Queue counters.
//!
//! Monotonic counters updated by the coordinator and drainers. They are for
//! operational visibility only; nothing in the queue reads them back.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by a queue and its drainers
#[derive(Debug, Default)]
pub(crate) struct QueueMetrics {
    submitted: AtomicU64,
    superseded: AtomicU64,
    synced: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    commit_failures: AtomicU64,
    propagate_failures: AtomicU64,
}

impl QueueMetrics {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_synced(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_propagate_failure(&self) {
        self.propagate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            propagate_failures: self.propagate_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Submissions accepted
    pub submitted: u64,
    /// Waiting operations replaced by a newer submission
    pub superseded: u64,
    /// Operations committed and propagated
    pub synced: u64,
    /// Retries scheduled after a failed attempt
    pub retries: u64,
    /// Operations that exhausted their attempts
    pub failed: u64,
    /// Waiting operations resolved because their drainer was torn down
    pub abandoned: u64,
    /// Failed commit attempts
    pub commit_failures: u64,
    /// Failed propagate attempts
    pub propagate_failures: u64,
}

impl MetricsSnapshot {
    /// Submissions that have reached a final outcome
    pub fn resolved(&self) -> u64 {
        self.superseded + self.synced + self.failed + self.abandoned
    }
}
