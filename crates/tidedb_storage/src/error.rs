//! Error types for TideDB storage engines.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage engine operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage instance was already closed.
    #[error("storage instance is closed: {database}/{collection}")]
    Closed {
        /// Database the instance belonged to.
        database: String,
        /// Collection the instance belonged to.
        collection: String,
    },

    /// A document payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying backend failed.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a closed-instance error.
    pub fn closed(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::Closed {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
