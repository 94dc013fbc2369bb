use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a row set over its lifetime.
#[derive(Debug, Default)]
pub(crate) struct PagingStats {
    pages_fetched: AtomicU64,
    rows_received: AtomicU64,
    bytes_received: AtomicU64,
    fetch_failures: AtomicU64,
    joined_fetches: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PagingStatsSnapshot {
    /// Pages merged after construction
    pub pages_fetched: u64,
    /// Rows those pages carried
    pub rows_received: u64,
    /// Approximate payload size of those rows
    pub bytes_received: u64,
    /// Fetches the page source failed
    pub fetch_failures: u64,
    /// Calls that waited on a fetch another caller started
    pub joined_fetches: u64,
    /// Blocking waits that gave up
    pub timeouts: u64,
}

impl PagingStats {
    pub(crate) fn record_page(&self, rows: usize, bytes: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_received.fetch_add(rows as u64, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_join(&self) {
        self.joined_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether any page was ever requested from the source.
    pub(crate) fn has_fetched(&self) -> bool {
        self.pages_fetched.load(Ordering::Relaxed) > 0
            || self.fetch_failures.load(Ordering::Relaxed) > 0
    }

    pub(crate) fn snapshot(&self) -> PagingStatsSnapshot {
        PagingStatsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            rows_received: self.rows_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            joined_fetches: self.joined_fetches.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
