//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding service failed or was unreachable
    #[error("Embedding service error: {0}")]
    Service(String),

    /// The service call exceeded its deadline
    #[error("Embedding request timed out after {0} ms")]
    Timeout(u64),

    /// Input that cannot be embedded (e.g. empty text)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Service returned a vector of unexpected length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
