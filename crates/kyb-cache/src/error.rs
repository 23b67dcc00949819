//! Error types for the disk cache

use thiserror::Error;

/// Errors that can occur during cache operations
///
/// Corrupt or missing entry files are not errors: they are counted, purged
/// and reported as misses.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload alone exceeds the byte cap
    #[error("Entry of {size} bytes exceeds the cache cap of {max} bytes")]
    EntryTooLarge {
        /// Encoded entry size
        size: u64,
        /// Configured byte cap
        max: u64,
    },

    /// Configuration rejected
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The cache has been closed
    #[error("Cache is closed")]
    Closed,
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
