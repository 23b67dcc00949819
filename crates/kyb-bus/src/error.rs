//! Error types for the communication manager

use kyb_domain::traits::ModuleError;
use thiserror::Error;

/// Errors returned to publishers and senders
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Queue full under the `drop` backpressure policy
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// The bus has stopped accepting work
    #[error("Bus is shutting down")]
    ShuttingDown,

    /// No mailbox registered for the message target
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// A mailbox or module with this name already exists
    #[error("Duplicate registration: {0}")]
    Duplicate(String),

    /// A module refused to start
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Configuration rejected
    #[error("Invalid bus configuration: {0}")]
    InvalidConfig(String),
}

/// Errors returned by event handlers
///
/// Retryable failures are redelivered with backoff; fatal ones go straight
/// to the dead-letter path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Transient failure; the bus may retry
    #[error("Retryable handler failure: {0}")]
    Retryable(String),

    /// Permanent failure; retrying will not help
    #[error("Fatal handler failure: {0}")]
    Fatal(String),
}

impl HandlerError {
    /// Whether the bus should retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

impl From<ModuleError> for HandlerError {
    fn from(err: ModuleError) -> Self {
        match err {
            ModuleError::Failed(reason) => HandlerError::Retryable(reason),
            other => HandlerError::Fatal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_map_to_retry_policy() {
        assert!(HandlerError::from(ModuleError::Failed("io".into())).is_retryable());
        assert!(!HandlerError::from(ModuleError::InvalidPayload("x".into())).is_retryable());
        assert!(!HandlerError::from(ModuleError::NotRunning("m".into())).is_retryable());
    }
}
