//! Error types for scoring

use thiserror::Error;

/// Errors raised when a scoring configuration is unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// Weight table or thresholds are malformed
    #[error("Invalid scoring configuration: {0}")]
    ConfigInvalid(String),
}
