//! Collection handles.
//!
//! The core's collection handle is deliberately thin: it owns the storage
//! instance for one (name, schema version) pair and its own lifecycle.
//! Document-level behavior (queries, validation, conflict handling) lives in
//! higher layers.

use crate::schema::CollectionSchema;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidedb_storage::StorageInstance;

/// Everything needed to add one collection to a database.
#[derive(Debug, Clone)]
pub struct CollectionCreator {
    /// The collection's schema.
    pub schema: CollectionSchema,
    /// Opaque per-collection options, forwarded to the storage engine.
    pub options: serde_json::Value,
}

impl CollectionCreator {
    /// Creates a creator with no extra options.
    #[must_use]
    pub fn new(schema: CollectionSchema) -> Self {
        Self {
            schema,
            options: serde_json::Value::Null,
        }
    }
}

impl From<CollectionSchema> for CollectionCreator {
    fn from(schema: CollectionSchema) -> Self {
        Self::new(schema)
    }
}

/// A live collection registered in a database instance.
pub struct Collection {
    name: String,
    schema: CollectionSchema,
    storage: Arc<dyn StorageInstance>,
    options: serde_json::Value,
    destroyed: AtomicBool,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        schema: CollectionSchema,
        storage: Arc<dyn StorageInstance>,
        options: serde_json::Value,
    ) -> Self {
        Self {
            name,
            schema,
            storage,
            options,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema this collection was opened with.
    #[must_use]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// The collection's storage instance.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageInstance> {
        &self.storage
    }

    /// The opaque options this collection was created with.
    #[must_use]
    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    /// Whether this handle has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Detaches the handle and closes its storage instance.
    ///
    /// Returns false if the collection was already destroyed. Stored data is
    /// untouched; removal is the database's job.
    pub async fn destroy(&self) -> crate::error::DbResult<bool> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        tracing::debug!(collection = %self.name, "destroying collection handle");
        self.storage.close().await?;
        Ok(true)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("version", &self.schema.version)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidedb_storage::{InstanceParams, MemoryEngine, StorageEngine};

    async fn test_collection() -> Collection {
        let engine = MemoryEngine::new();
        let schema = CollectionSchema::new(0, serde_json::json!({"fields": ["id"]}));
        let storage = engine
            .create_instance(InstanceParams {
                database_name: "testdb".to_string(),
                collection_name: "heroes".to_string(),
                schema: serde_json::to_value(&schema).unwrap(),
                schema_version: 0,
                options: serde_json::Value::Null,
                multi_instance: false,
            })
            .await
            .unwrap();
        Collection::new(
            "heroes".to_string(),
            schema,
            storage,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let collection = test_collection().await;
        assert!(!collection.is_destroyed());
        assert!(collection.destroy().await.unwrap());
        assert!(!collection.destroy().await.unwrap());
        assert!(collection.is_destroyed());
    }

    #[tokio::test]
    async fn destroy_closes_storage() {
        let collection = test_collection().await;
        collection.destroy().await.unwrap();
        assert!(collection.storage().all_documents().await.is_err());
    }
}
