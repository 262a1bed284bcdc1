//! # recall-types
//!
//! Shared domain types for the Recall semantic memory system.
//!
//! This crate defines the record types that flow between the memory store
//! and the orchestration layer:
//! - [`MemoryRecord`]: a single unit of long-term memory with ownership,
//!   activity, and relevance metadata
//! - [`MemoryKind`]: classification of what a memory describes

pub mod record;

pub use record::{MemoryKind, MemoryRecord};
