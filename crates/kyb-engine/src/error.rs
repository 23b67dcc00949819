//! Error types for the engine

use kyb_bus::BusError;
use kyb_cache::CacheError;
use kyb_domain::RequestError;
use kyb_index::IndexError;
use kyb_scoring::ScoringError;
use thiserror::Error;

/// Errors surfaced by the engine
///
/// Per-request failures of non-essential strategies never appear here; they
/// degrade the result instead. What remains is malformed input, startup
/// configuration problems and an unusable index.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request rejected at the boundary
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Startup-fatal configuration problem
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No index could be loaded from the source or the cache
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The index changed while a refresh was loading; the refresh was dropped
    #[error("Index refresh superseded by version {0}")]
    Superseded(u64),

    /// Index data could not be used
    #[error("Index error: {0}")]
    Index(IndexError),

    /// Disk cache failure outside the self-healing paths
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Bus failure
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Failed to read a configuration file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A strategy worker task panicked or was cancelled
    #[error("Strategy worker failed: {0}")]
    Worker(String),

    /// The engine has been shut down
    #[error("Engine is shut down")]
    ShutDown,
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::SourceUnavailable(msg) => EngineError::SourceUnavailable(msg),
            other => EngineError::Index(other),
        }
    }
}

impl From<ScoringError> for EngineError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::ConfigInvalid(msg) => EngineError::ConfigInvalid(msg),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_maps_through() {
        let err: EngineError = IndexError::SourceUnavailable("db down".to_string()).into();
        assert!(matches!(err, EngineError::SourceUnavailable(ref m) if m == "db down"));

        let err: EngineError = IndexError::InvalidData("bad row".to_string()).into();
        assert!(matches!(err, EngineError::Index(_)));
    }

    #[test]
    fn test_scoring_error_is_config_invalid() {
        let err: EngineError = ScoringError::ConfigInvalid("missing weight".to_string()).into();
        assert_eq!(err.to_string(), "Invalid configuration: missing weight");
    }
}
