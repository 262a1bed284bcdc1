//! Store configuration.
//!
//! Wraps the index tuning surface with store-level knobs: reduction
//! method, search widening, embedding timeout, and the cleanup cycle.

use recall_index::{ConfigError, IndexConfig, ReductionMethod};
use serde::{Deserialize, Serialize};

/// Background cleanup configuration.
///
/// Soft-deleted records become invisible to search immediately; their
/// metadata is reclaimed only by the cleanup task, and only once the grace
/// period has elapsed. The grace period keeps a record resolvable for
/// readers that picked up its id just before the delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Whether the background task runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between cleanup cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds a tombstone must age before physical removal
    #[serde(default = "default_grace")]
    pub grace_period_secs: u64,

    /// Maximum tombstones processed per cycle
    #[serde(default = "default_batch")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_grace() -> u64 {
    600
}

fn default_batch() -> usize {
    64
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval(),
            grace_period_secs: default_grace(),
            batch_size: default_batch(),
        }
    }
}

/// Memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Index tuning parameters
    #[serde(default)]
    pub index: IndexConfig,

    /// How source embeddings are mapped onto the index dimension
    #[serde(default)]
    pub reduction: ReductionMethod,

    /// Cap on the widened candidate count used to absorb post-filtering
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Deadline for a single embedding service call
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_ms: u64,

    /// Tombstoned share of graph slots that triggers a rebuild
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold: f32,

    /// Bounded wait for the graph gate from maintenance paths
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_ms: u64,

    /// Bounded wait for the cleanup task during shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,

    /// Background cleanup settings
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

fn default_max_candidates() -> usize {
    256
}

fn default_embed_timeout() -> u64 {
    5_000
}

fn default_rebuild_threshold() -> f32 {
    0.3
}

fn default_gate_timeout() -> u64 {
    2_000
}

fn default_shutdown_timeout() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            reduction: ReductionMethod::default(),
            max_candidates: default_max_candidates(),
            embed_timeout_ms: default_embed_timeout(),
            rebuild_threshold: default_rebuild_threshold(),
            gate_timeout_ms: default_gate_timeout(),
            shutdown_timeout_ms: default_shutdown_timeout(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Low-memory preset for local development.
    pub fn development() -> Self {
        Self {
            index: IndexConfig::development(),
            ..Default::default()
        }
    }

    /// Balanced preset.
    pub fn production() -> Self {
        Self {
            index: IndexConfig::production(),
            ..Default::default()
        }
    }

    /// Recall-first preset.
    pub fn enterprise() -> Self {
        Self {
            index: IndexConfig::enterprise(),
            ..Default::default()
        }
    }

    pub fn with_reduction(mut self, reduction: ReductionMethod) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Validate every numeric invariant, failing on the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.index.validate()?;
        if self.max_candidates == 0 {
            return Err(ConfigError::new(
                "max_candidates",
                self.max_candidates,
                "must be >= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.rebuild_threshold) || self.rebuild_threshold == 0.0 {
            return Err(ConfigError::new(
                "rebuild_threshold",
                self.rebuild_threshold,
                "must be in (0.0, 1.0]",
            ));
        }
        if self.cleanup.batch_size == 0 {
            return Err(ConfigError::new(
                "cleanup.batch_size",
                self.cleanup.batch_size,
                "must be >= 1",
            ));
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::new(
                "cleanup.interval_secs",
                self.cleanup.interval_secs,
                "must be >= 1 when cleanup is enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        StoreConfig::development().validate().unwrap();
        StoreConfig::production().validate().unwrap();
        StoreConfig::enterprise().validate().unwrap();
    }

    #[test]
    fn test_invalid_fields_named() {
        let mut config = StoreConfig::development();
        config.max_candidates = 0;
        assert_eq!(config.validate().unwrap_err().field, "max_candidates");

        let mut config = StoreConfig::development();
        config.rebuild_threshold = 1.5;
        assert_eq!(config.validate().unwrap_err().field, "rebuild_threshold");

        let mut config = StoreConfig::development();
        config.cleanup.batch_size = 0;
        assert_eq!(config.validate().unwrap_err().field, "cleanup.batch_size");

        let mut config = StoreConfig::development();
        config.cleanup.interval_secs = 0;
        assert_eq!(config.validate().unwrap_err().field, "cleanup.interval_secs");
    }

    #[test]
    fn test_nested_index_error_propagates() {
        let mut config = StoreConfig::development();
        config.index.m = 0;
        assert_eq!(config.validate().unwrap_err().field, "m");
    }

    #[test]
    fn test_serde_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_candidates, 256);
        assert_eq!(config.cleanup.grace_period_secs, 600);
        assert!(config.cleanup.enabled);
        config.validate().unwrap();
    }
}
