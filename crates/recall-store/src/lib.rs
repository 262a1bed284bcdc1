//! # recall-store
//!
//! Concurrent in-memory semantic memory store for Recall.
//!
//! Wraps the `recall-index` HNSW graph with everything the orchestration
//! layer needs from long-term memory:
//! - record metadata with soft-delete and grace-period cleanup
//! - external-id <-> internal-index mapping (the graph itself never sees
//!   external ids)
//! - a single graph gate serializing insert/search/rebuild
//! - degraded-mode substring search when embedding or the graph fails
//! - lock-free observability counters
//!
//! The [`MemoryStorage`] trait is the seam agents consume; it is designed
//! to be swappable with an exact-match SQL-backed implementation.

pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod store;

pub use config::{CleanupConfig, StoreConfig};
pub use error::StoreError;
pub use metrics::MetricsSnapshot;
pub use storage::MemoryStorage;
pub use store::MemoryStore;
