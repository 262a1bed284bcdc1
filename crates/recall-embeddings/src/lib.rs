//! # recall-embeddings
//!
//! Embedding value type and the provider seam for Recall.
//!
//! Embeddings are produced by an external embedding service; this crate
//! defines only the boundary: the [`Embedding`] vector type and the
//! [`EmbeddingProvider`] trait the memory store consumes. Concrete
//! providers (HTTP clients, local models) live outside the core.

pub mod error;
pub mod provider;

pub use error::EmbeddingError;
pub use provider::{Embedding, EmbeddingProvider};
