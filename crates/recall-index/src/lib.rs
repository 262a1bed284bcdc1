//! # recall-index
//!
//! Approximate nearest-neighbor core for Recall.
//!
//! This crate provides the vector-index subsystem: an incremental HNSW
//! graph with configurable fan-out and candidate widths, SIMD distance
//! kernels, dimensionality reduction, and scalar quantization.
//!
//! ## Features
//! - Incremental HNSW insertion and k-NN search (no batch rebuild needed)
//! - Cosine, Euclidean, and dot-product metrics with an 8-wide SIMD path
//! - Truncation, magnitude-selection, and cached random-projection reducers
//! - u8/i16 scalar quantization of graph storage
//! - Named presets (development / production / enterprise)
//!
//! The graph is deliberately unaware of external ids, deletion, and
//! persistence; those concerns live in `recall-store`.

pub mod config;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod quantize;
pub mod reduce;
mod visited;

pub use config::{IndexConfig, QuantizationMode, VectorSize};
pub use error::{ConfigError, IndexError};
pub use graph::HnswGraph;
pub use kernel::{distance, distance_scalar, similarity_from, Metric};
pub use quantize::{QuantizedVector, QuantizedVectorI16};
pub use reduce::{reduce, ReductionMethod};
