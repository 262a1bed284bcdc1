//! Memory storage trait.
//!
//! The seam consumed by the orchestration layer (agents, tool packs). An
//! exact-match SQL-backed implementation can stand in for the vector store
//! without callers noticing anything beyond recall quality.

use async_trait::async_trait;

use recall_types::MemoryRecord;

use crate::error::StoreError;

/// Long-term memory storage interface.
#[async_trait]
pub trait MemoryStorage: Send + Sync {
    /// Store a record and make it searchable. Returns the record id.
    async fn add_memory(&self, record: MemoryRecord) -> Result<String, StoreError>;

    /// Semantic search over one owner's active records, ranked by
    /// descending similarity. Recoverable failures degrade to a substring
    /// fallback rather than erroring.
    async fn search_memories(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// All active records for an owner, optionally scoped to a session.
    async fn get_memories(
        &self,
        owner_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Look up a single record by id (active or soft-deleted).
    async fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>, StoreError>;

    /// Metadata-only update. The stored vector is not regenerated; use
    /// `refresh_memory` on the concrete store when the embedding must
    /// follow the content.
    async fn update_memory(&self, record: MemoryRecord) -> Result<(), StoreError>;

    /// Soft-delete a record. Idempotent; unknown ids are a no-op.
    async fn delete_memory(&self, id: &str) -> Result<(), StoreError>;

    /// Drop all records and the index.
    async fn clear(&self) -> Result<(), StoreError>;
}
