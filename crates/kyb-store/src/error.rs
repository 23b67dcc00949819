//! Error types for the SQLite store

use kyb_domain::traits::SourceError;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row holds a value the domain does not know
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<StoreError> for SourceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e @ rusqlite::Error::FromSqlConversionFailure(..)) => {
                SourceError::InvalidData(e.to_string())
            }
            StoreError::Database(e) => SourceError::Unavailable(e.to_string()),
            other => SourceError::InvalidData(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_are_unavailable() {
        let err = StoreError::Database(rusqlite::Error::InvalidQuery);
        assert!(matches!(SourceError::from(err), SourceError::Unavailable(_)));

        let err = StoreError::InvalidData("bad category".to_string());
        assert!(matches!(SourceError::from(err), SourceError::InvalidData(_)));
    }
}
