//! Collection schemas.
//!
//! The core does not validate or compile document schemas; it only needs the
//! version, the encryption requirement, and a deterministic hash to detect
//! incompatible redeployments.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A collection's schema as accepted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Schema version. Bumped by the application on incompatible changes;
    /// each version gets its own storage instance and descriptor.
    pub version: u32,
    /// Whether documents of this collection must be encrypted. Requires the
    /// database to have been created with a password.
    #[serde(default)]
    pub encrypted: bool,
    /// The schema definition itself, opaque to the core.
    pub definition: serde_json::Value,
}

impl CollectionSchema {
    /// Creates a schema with the given version and definition.
    #[must_use]
    pub fn new(version: u32, definition: serde_json::Value) -> Self {
        Self {
            version,
            encrypted: false,
            definition,
        }
    }

    /// Marks the schema as requiring encryption.
    #[must_use]
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Deterministic content hash of the schema.
    ///
    /// Two schemas hash equal exactly when version, encryption flag, and
    /// definition are all equal.
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update([u8::from(self.encrypted)]);
        hasher.update(self.definition.to_string().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let schema = CollectionSchema::new(0, serde_json::json!({"fields": ["name", "color"]}));
        assert_eq!(schema.hash(), schema.clone().hash());
    }

    #[test]
    fn hash_differs_on_definition() {
        let a = CollectionSchema::new(0, serde_json::json!({"fields": ["name"]}));
        let b = CollectionSchema::new(0, serde_json::json!({"fields": ["color"]}));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_differs_on_version_and_encryption() {
        let base = CollectionSchema::new(0, serde_json::json!({}));
        let versioned = CollectionSchema::new(1, serde_json::json!({}));
        let encrypted = CollectionSchema::new(0, serde_json::json!({})).encrypted(true);
        assert_ne!(base.hash(), versioned.hash());
        assert_ne!(base.hash(), encrypted.hash());
    }
}
