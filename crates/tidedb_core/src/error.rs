//! Error types for the TideDB core.

use std::sync::Arc;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in database orchestrator operations.
///
/// Every variant maps to a stable error kind string via [`DbError::kind`];
/// callers are expected to match on the kind rather than on display text.
#[derive(Debug, Error)]
pub enum DbError {
    /// A collection schema requires encryption but the database was created
    /// without a password.
    #[error("collection {collection} requires encryption but no password was set")]
    MissingPassword {
        /// The collection whose schema requires encryption.
        collection: String,
    },

    /// The supplied password failed validation.
    #[error("invalid password: {message}")]
    InvalidPassword {
        /// Description of the validation failure.
        message: String,
    },

    /// A collection with this name is already registered in this instance.
    #[error("collection {collection} already exists in this database instance")]
    DuplicateCollection {
        /// Name of the already-registered collection.
        collection: String,
    },

    /// A persisted collection descriptor carries a different schema than the
    /// one requested for the same name and version.
    #[error(
        "schema mismatch for collection {collection}: persisted hash {previous_schema_hash}, requested hash {schema_hash}"
    )]
    SchemaMismatch {
        /// The collection with conflicting schemas.
        collection: String,
        /// Hash of the schema already persisted.
        previous_schema_hash: String,
        /// Hash of the schema that was requested.
        schema_hash: String,
        /// The schema already persisted, for diagnosis.
        previous_schema: serde_json::Value,
        /// The schema that was requested, for diagnosis.
        schema: serde_json::Value,
    },

    /// A live database with this name already exists in this process.
    #[error("database name {name} is already in use (set ignore_duplicate to allow this)")]
    DuplicateDatabaseName {
        /// The contested database name.
        name: String,
    },

    /// Internal state that must exist was not found. Signals a bug or
    /// corrupted storage; never handled, only propagated.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// An optional capability was invoked but is not installed.
    #[error("capability not installed: {capability}")]
    CapabilityNotInstalled {
        /// Name of the missing capability.
        capability: &'static str,
    },

    /// The storage token could not be initialized.
    #[error("storage token unavailable: {0}")]
    StorageToken(#[source] Arc<DbError>),

    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(#[from] tidedb_storage::StorageError),

    /// A document payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Returns the stable error kind identifier for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingPassword { .. } => "missing-password",
            Self::InvalidPassword { .. } => "invalid-password",
            Self::DuplicateCollection { .. } => "duplicate-collection",
            Self::SchemaMismatch { .. } => "schema-mismatch",
            Self::DuplicateDatabaseName { .. } => "duplicate-database-name",
            Self::InvariantViolation { .. } => "invariant-violation",
            Self::CapabilityNotInstalled { .. } => "capability-not-installed",
            Self::StorageToken(_) => "storage-token",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Creates a missing-password error.
    pub fn missing_password(collection: impl Into<String>) -> Self {
        Self::MissingPassword {
            collection: collection.into(),
        }
    }

    /// Creates an invalid-password error.
    pub fn invalid_password(message: impl Into<String>) -> Self {
        Self::InvalidPassword {
            message: message.into(),
        }
    }

    /// Creates a duplicate-collection error.
    pub fn duplicate_collection(collection: impl Into<String>) -> Self {
        Self::DuplicateCollection {
            collection: collection.into(),
        }
    }

    /// Creates a duplicate-database-name error.
    pub fn duplicate_database_name(name: impl Into<String>) -> Self {
        Self::DuplicateDatabaseName { name: name.into() }
    }

    /// Creates an invariant-violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a capability-not-installed error.
    pub fn capability_not_installed(capability: &'static str) -> Self {
        Self::CapabilityNotInstalled { capability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(DbError::missing_password("users").kind(), "missing-password");
        assert_eq!(
            DbError::duplicate_collection("users").kind(),
            "duplicate-collection"
        );
        assert_eq!(
            DbError::duplicate_database_name("heroes").kind(),
            "duplicate-database-name"
        );
        assert_eq!(
            DbError::invariant_violation("boom").kind(),
            "invariant-violation"
        );
        assert_eq!(
            DbError::capability_not_installed("json-dump").kind(),
            "capability-not-installed"
        );
    }

    #[test]
    fn display_names_the_capability() {
        let err = DbError::capability_not_installed("leader-election");
        assert!(err.to_string().contains("leader-election"));
    }
}
