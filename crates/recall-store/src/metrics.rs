//! Store observability counters.
//!
//! Counters are relaxed atomics updated from the hot paths; the snapshot
//! is intentionally non-transactional and never takes the graph gate.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Internal counter block. One instance per store.
#[derive(Debug, Default)]
pub(crate) struct StoreMetrics {
    pub vector_count: AtomicUsize,
    pub inserts: AtomicU64,
    pub searches: AtomicU64,
    pub fallback_searches: AtomicU64,
    pub deletes: AtomicU64,
    pub cleanup_purges: AtomicU64,
    pub embed_failures: AtomicU64,
    pub rebuilds: AtomicU64,
}

impl StoreMetrics {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read-only observability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Vectors currently in the graph (live + tombstoned slots)
    pub vector_count: usize,
    /// Records in the metadata map (active + soft-deleted awaiting cleanup)
    pub record_count: usize,
    /// Tombstones waiting in the cleanup queue
    pub pending_deletes: usize,
    /// Successful graph inserts since startup
    pub inserts: u64,
    /// Search calls since startup (vector and fallback combined)
    pub searches: u64,
    /// Searches served by the substring fallback
    pub fallback_searches: u64,
    /// Soft deletes since startup
    pub deletes: u64,
    /// Records physically removed by cleanup
    pub cleanup_purges: u64,
    /// Embedding service failures
    pub embed_failures: u64,
    /// Graph rebuilds triggered by tombstone pressure
    pub rebuilds: u64,
    /// Estimated index memory footprint in bytes
    pub estimated_memory_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_increments() {
        let metrics = StoreMetrics::default();
        StoreMetrics::bump(&metrics.inserts);
        StoreMetrics::bump(&metrics.inserts);
        assert_eq!(metrics.inserts.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MetricsSnapshot {
            vector_count: 10,
            record_count: 9,
            pending_deletes: 1,
            inserts: 10,
            searches: 4,
            fallback_searches: 1,
            deletes: 1,
            cleanup_purges: 0,
            embed_failures: 1,
            rebuilds: 0,
            estimated_memory_bytes: 10 * 352,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"vector_count\":10"));
    }
}
