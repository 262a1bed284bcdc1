//! Memory store error taxonomy.
//!
//! Configuration and dimension errors are fatal to the call that triggered
//! them. Embedding failures are recoverable: search degrades to the
//! substring fallback instead of propagating them. `Concurrency` marks an
//! internal invariant breach and should never occur while the graph gate
//! discipline holds. `Persistence` exists for taxonomy compatibility with
//! the sibling disk-backed engine and is unused by the in-memory store.

use recall_embeddings::EmbeddingError;
use recall_index::{ConfigError, IndexError};
use thiserror::Error;

/// Errors surfaced by the memory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid tuning parameter
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Vector length inconsistent with the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// External embedding service failure (recoverable)
    #[error("Embedding generation failed: {0}")]
    EmbeddingGeneration(#[from] EmbeddingError),

    /// Internal invariant violated under contention (a bug if raised)
    #[error("Concurrency invariant violated: {0}")]
    Concurrency(String),

    /// Storage-layer failure (disk-backed sibling engines only)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No record with the given id
    #[error("Memory not found: {0}")]
    NotFound(String),
}

impl From<IndexError> for StoreError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Config(e) => StoreError::Config(e),
            IndexError::DimensionMismatch { expected, actual } => {
                StoreError::DimensionMismatch { expected, actual }
            }
        }
    }
}
