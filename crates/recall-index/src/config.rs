//! Index configuration and tuning presets.
//!
//! All invariants are validated eagerly; an invalid parameter fails fast
//! with a [`ConfigError`] naming the field, the value, and the violated
//! constraint. Once validated the configuration is treated as immutable.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kernel::Metric;

/// Upper bound on graph fan-out. Larger values waste memory without
/// improving recall for realistic corpus sizes.
pub const MAX_M: usize = 100;

/// Maximum number of layers in the HNSW graph.
pub const DEFAULT_MAX_LAYERS: usize = 16;

/// Per-vector bookkeeping outside the component data: layer byte, arena
/// offsets, quantization min/scale, neighbor-list headers.
pub const VECTOR_FIXED_OVERHEAD_BYTES: usize = 32;

/// Named embedding sizes. The index works on the resolved dimension; the
/// names exist so configs stay readable across deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSize {
    /// 256 dimensions
    Small,
    /// 512 dimensions
    Medium,
    /// 768 dimensions
    Large,
    /// 1536 dimensions
    XLarge,
    /// Caller-specified dimension
    Custom(usize),
}

impl VectorSize {
    /// Resolve to the concrete dimension count.
    pub fn dimensions(&self) -> usize {
        match self {
            VectorSize::Small => 256,
            VectorSize::Medium => 512,
            VectorSize::Large => 768,
            VectorSize::XLarge => 1536,
            VectorSize::Custom(n) => *n,
        }
    }
}

/// Per-component storage precision inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    /// Full f32 precision
    None,
    /// 8-bit scalar quantization (4x memory reduction)
    Int8,
    /// 16-bit scalar quantization (2x memory reduction)
    Int16,
}

impl QuantizationMode {
    /// Bytes used per vector component.
    pub fn bytes_per_component(&self) -> usize {
        match self {
            QuantizationMode::None => 4,
            QuantizationMode::Int8 => 1,
            QuantizationMode::Int16 => 2,
        }
    }
}

/// HNSW index configuration.
///
/// Controls the trade-off between build speed, search speed, recall, and
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Target embedding size stored in the graph
    #[serde(default = "default_size")]
    pub size: VectorSize,

    /// Bidirectional links per node per layer (layer 0 uses `2 * m`)
    #[serde(default = "default_m")]
    pub m: usize,

    /// Candidate list width during construction
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Candidate list width during search (higher = better recall, slower)
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    /// Distance function for similarity computation
    #[serde(default)]
    pub metric: Metric,

    /// Per-component storage precision
    #[serde(default = "default_quantization")]
    pub quantization: QuantizationMode,

    /// Results below this similarity are dropped from search output
    #[serde(default)]
    pub similarity_threshold: f32,

    /// Maximum graph layers
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
}

fn default_size() -> VectorSize {
    VectorSize::Medium
}

fn default_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

fn default_quantization() -> QuantizationMode {
    QuantizationMode::Int8
}

fn default_max_layers() -> usize {
    DEFAULT_MAX_LAYERS
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl IndexConfig {
    /// Low-memory preset for local development: small graph fan-out,
    /// shallow candidate lists, 8-bit storage.
    pub fn development() -> Self {
        Self {
            size: VectorSize::Small,
            m: 8,
            ef_construction: 100,
            ef_search: 32,
            metric: Metric::Cosine,
            quantization: QuantizationMode::Int8,
            similarity_threshold: 0.0,
            max_layers: DEFAULT_MAX_LAYERS,
        }
    }

    /// Balanced preset: default fan-out with 8-bit storage.
    pub fn production() -> Self {
        Self {
            size: VectorSize::Medium,
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            metric: Metric::Cosine,
            quantization: QuantizationMode::Int8,
            similarity_threshold: 0.0,
            max_layers: DEFAULT_MAX_LAYERS,
        }
    }

    /// Recall-first preset: wide fan-out, deep candidate lists, full
    /// f32 precision.
    pub fn enterprise() -> Self {
        Self {
            size: VectorSize::Large,
            m: 32,
            ef_construction: 400,
            ef_search: 128,
            metric: Metric::Cosine,
            quantization: QuantizationMode::None,
            similarity_threshold: 0.0,
            max_layers: DEFAULT_MAX_LAYERS,
        }
    }

    pub fn with_size(mut self, size: VectorSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_expansion(mut self, ef_construction: usize, ef_search: usize) -> Self {
        self.ef_construction = ef_construction;
        self.ef_search = ef_search;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_quantization(mut self, quantization: QuantizationMode) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Resolved embedding dimension.
    pub fn dimensions(&self) -> usize {
        self.size.dimensions()
    }

    /// Bytes used per vector component in graph storage.
    pub fn bytes_per_component(&self) -> usize {
        self.quantization.bytes_per_component()
    }

    /// Estimated memory footprint of one indexed vector: component data
    /// plus neighbor links (4 bytes per link) plus fixed bookkeeping.
    pub fn estimated_bytes_per_vector(&self) -> usize {
        self.dimensions() * self.bytes_per_component()
            + self.m * 4
            + VECTOR_FIXED_OVERHEAD_BYTES
    }

    /// Validate every numeric invariant, failing on the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions() == 0 {
            return Err(ConfigError::new(
                "size",
                self.dimensions(),
                "resolved dimension must be >= 1",
            ));
        }
        if self.m < 1 || self.m > MAX_M {
            return Err(ConfigError::new("m", self.m, "must be in 1..=100"));
        }
        if self.ef_construction == 0 {
            return Err(ConfigError::new(
                "ef_construction",
                self.ef_construction,
                "must be > 0",
            ));
        }
        if self.ef_search == 0 {
            return Err(ConfigError::new("ef_search", self.ef_search, "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::new(
                "similarity_threshold",
                self.similarity_threshold,
                "must be in 0.0..=1.0",
            ));
        }
        if self.max_layers == 0 {
            return Err(ConfigError::new(
                "max_layers",
                self.max_layers,
                "must be >= 1",
            ));
        }
        Ok(())
    }
}
