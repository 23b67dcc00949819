//! Error types for index operations

use kyb_domain::traits::SourceError;
use thiserror::Error;

/// Errors that can occur while loading or compiling the index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Backing store unreachable
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Backing store returned unusable data
    #[error("Invalid index data: {0}")]
    InvalidData(String),

    /// A keyword or detector pattern failed to compile
    #[error("Pattern compile error in '{name}': {message}")]
    PatternCompile {
        /// Keyword id or detector name
        name: String,
        /// Compiler message
        message: String,
    },
}

impl From<SourceError> for IndexError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable(msg) => IndexError::SourceUnavailable(msg),
            SourceError::InvalidData(msg) => IndexError::InvalidData(msg),
        }
    }
}
