//! Index error types.

use thiserror::Error;

/// A tuning parameter failed validation.
///
/// Always names the offending field, the rejected value, and the constraint
/// it violated, so configuration mistakes are diagnosable from the message
/// alone.
#[derive(Debug, Clone, Error)]
#[error("invalid configuration: {field} = {value} violates '{constraint}'")]
pub struct ConfigError {
    /// Name of the offending field
    pub field: &'static str,
    /// The rejected value, rendered as text
    pub value: String,
    /// The constraint that was violated
    pub constraint: &'static str,
}

impl ConfigError {
    pub fn new(field: &'static str, value: impl ToString, constraint: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            constraint,
        }
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid tuning parameter
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Vector length inconsistent with the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
