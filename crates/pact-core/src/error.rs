//! Error types for pact-core

use thiserror::Error;

use crate::models::ConflictId;

/// Result type alias using pact-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pact-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A local mutation could not be written to the queue
    #[error("Failed to enqueue mutation: {0}")]
    Enqueue(String),

    /// The remote store rejected or failed a collection sync
    #[error(transparent)]
    SyncTransport(#[from] SyncTransportError),

    /// No active conflict with the given id
    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// No relationship sync status with the given id
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    /// No (unexpired) backup with the given id
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// The strategy cannot be applied automatically
    #[error("Unsupported resolution strategy: {0}")]
    UnsupportedStrategy(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Uniform failure signal from the remote sync gate.
///
/// The core never interprets transport details; every variant is treated
/// as "sync failed" and retried.
#[derive(Error, Debug)]
pub enum SyncTransportError {
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote rejected sync of '{collection}': {message}")]
    Rejected { collection: String, message: String },
    #[error("Remote sync unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether this error is a caller or configuration error that must not
    /// be retried.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ConflictNotFound(_)
                | Self::RelationshipNotFound(_)
                | Self::BackupNotFound(_)
                | Self::UnsupportedStrategy(_)
                | Self::InvalidInput(_)
                | Self::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(Error::BackupNotFound("b1".to_string()).is_caller_error());
        assert!(Error::UnsupportedStrategy("manual".to_string()).is_caller_error());
        assert!(!Error::Database("disk full".to_string()).is_caller_error());
        assert!(!Error::from(SyncTransportError::Unavailable("offline".to_string()))
            .is_caller_error());
    }
}
