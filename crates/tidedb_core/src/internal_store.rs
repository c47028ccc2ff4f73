//! Internal metadata store.
//!
//! Every database keeps one storage instance under a reserved collection
//! name. It holds the collection descriptors (one per collection name and
//! schema version) and the persisted storage token. All writes to it are
//! whole-document revisioned writes so concurrent instances attached to the
//! same storage resolve races through the storage layer's conflict check.

use crate::error::{DbError, DbResult};
use crate::idle::IdleQueue;
use crate::revision::{create_revision, now_millis};
use crate::schema::CollectionSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidedb_storage::{
    BulkWriteResult, DocumentData, InstanceParams, StorageEngine, StorageInstance, WriteRow,
};
use uuid::Uuid;

/// Reserved collection name of the internal metadata store.
pub const INTERNAL_STORE_COLLECTION: &str = "_tidedb_internal";

/// Key of the storage-token document.
pub const STORAGE_TOKEN_KEY: &str = "storageToken";

/// Descriptor of one collection at one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// Deterministic hash of the schema, used to detect incompatible
    /// redeployments.
    pub schema_hash: String,
    /// The full schema, kept so storage instances of removed collections can
    /// be re-derived without a live collection handle.
    pub schema: CollectionSchema,
    /// The schema version this descriptor belongs to.
    pub version: u32,
}

/// Payload of the storage-token document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTokenData {
    /// The token persisted once per physical storage.
    pub token: String,
}

/// Typed payload of an internal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "context", content = "data", rename_all = "kebab-case")]
pub enum InternalData {
    /// A collection descriptor.
    Collection(CollectionMetadata),
    /// The storage token.
    StorageToken(StorageTokenData),
}

/// A document of the internal metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalDocument {
    /// Document key; `"<collectionName>-<schemaVersion>"` for descriptors.
    pub key: String,
    /// Typed payload.
    #[serde(flatten)]
    pub data: InternalData,
}

impl InternalDocument {
    /// The context segment of the document id.
    #[must_use]
    pub fn context(&self) -> &'static str {
        match self.data {
            InternalData::Collection(_) => "collection",
            InternalData::StorageToken(_) => "storage-token",
        }
    }

    /// The primary key under which this document is stored.
    #[must_use]
    pub fn document_id(&self) -> String {
        format!("{}|{}", self.context(), self.key)
    }

    /// Builds an insert row with a freshly computed revision.
    pub fn into_insert_row(self) -> DbResult<WriteRow> {
        let id = self.document_id();
        let payload = serde_json::to_value(self)?;
        let revision = create_revision(&payload, false, None);
        Ok(WriteRow::insert(DocumentData {
            id,
            payload,
            deleted: false,
            revision,
            last_write_time: now_millis(),
        }))
    }

    /// Decodes an internal document from its stored form.
    pub fn from_document(doc: &DocumentData) -> DbResult<Self> {
        Ok(serde_json::from_value(doc.payload.clone())?)
    }
}

/// Key of a collection descriptor: `"<collectionName>-<schemaVersion>"`.
#[must_use]
pub fn collection_key(name: &str, version: u32) -> String {
    format!("{name}-{version}")
}

/// The internal store's own schema.
#[must_use]
pub fn internal_store_schema() -> CollectionSchema {
    CollectionSchema::new(
        0,
        serde_json::json!({
            "primary_key": "id",
            "fields": ["key", "context", "data"],
        }),
    )
}

/// Opens the internal metadata storage instance for a database name.
pub(crate) async fn open_internal_store(
    engine: &Arc<dyn StorageEngine>,
    database_name: &str,
    options: &serde_json::Value,
    multi_instance: bool,
) -> DbResult<Arc<dyn StorageInstance>> {
    let schema = internal_store_schema();
    let instance = engine
        .create_instance(InstanceParams {
            database_name: database_name.to_string(),
            collection_name: INTERNAL_STORE_COLLECTION.to_string(),
            schema: serde_json::to_value(&schema)?,
            schema_version: schema.version,
            options: options.clone(),
            multi_instance,
        })
        .await?;
    Ok(instance)
}

/// The internal store as used by a live database.
///
/// Wraps the raw storage instance so every access is tracked by the idle
/// queue; teardown can then wait until no metadata operation is in flight.
pub struct InstrumentedStore {
    inner: Arc<dyn StorageInstance>,
    idle: Arc<IdleQueue>,
}

impl std::fmt::Debug for InstrumentedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedStore")
            .field("collection", &self.inner.collection_name())
            .finish_non_exhaustive()
    }
}

impl InstrumentedStore {
    /// Wraps a raw storage instance.
    pub fn new(inner: Arc<dyn StorageInstance>, idle: Arc<IdleQueue>) -> Self {
        Self { inner, idle }
    }

    /// Performs a tracked conditional bulk write.
    pub async fn bulk_write(&self, rows: Vec<WriteRow>) -> DbResult<BulkWriteResult> {
        let inner = Arc::clone(&self.inner);
        let result = self
            .idle
            .wrap_call(async move { inner.bulk_write(rows).await })
            .await?;
        Ok(result)
    }

    /// Fetches documents by id, tracked.
    pub async fn find_by_id(&self, ids: &[String]) -> DbResult<Vec<DocumentData>> {
        let inner = Arc::clone(&self.inner);
        let ids = ids.to_vec();
        let docs = self
            .idle
            .wrap_call(async move { inner.find_by_id(&ids).await })
            .await?;
        Ok(docs)
    }

    /// Returns all stored documents, tracked.
    pub async fn all_documents(&self) -> DbResult<Vec<DocumentData>> {
        let inner = Arc::clone(&self.inner);
        let docs = self
            .idle
            .wrap_call(async move { inner.all_documents().await })
            .await?;
        Ok(docs)
    }

    /// Closes the underlying instance.
    pub async fn close(&self) -> DbResult<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// Creates or adopts the storage token for the storage behind `store`.
///
/// The first instance to run this persists a fresh token; every later
/// instance loses the conditional write and adopts the already-persisted
/// token from the conflict report. Either way all instances attached to the
/// same storage end up with the same value.
pub(crate) async fn ensure_storage_token_exists(store: &InstrumentedStore) -> DbResult<String> {
    let candidate = Uuid::new_v4().to_string();
    let doc = InternalDocument {
        key: STORAGE_TOKEN_KEY.to_string(),
        data: InternalData::StorageToken(StorageTokenData {
            token: candidate.clone(),
        }),
    };
    let result = store.bulk_write(vec![doc.into_insert_row()?]).await?;

    match result.conflicts.first() {
        None => {
            tracing::debug!(token = %candidate, "persisted fresh storage token");
            Ok(candidate)
        }
        Some(conflict) => {
            let existing = InternalDocument::from_document(&conflict.document_in_db)?;
            match existing.data {
                InternalData::StorageToken(data) => {
                    tracing::debug!(token = %data.token, "adopted existing storage token");
                    Ok(data.token)
                }
                InternalData::Collection(_) => Err(DbError::invariant_violation(
                    "storage token document holds a collection descriptor",
                )),
            }
        }
    }
}

/// Extracts all live collection descriptors from the store's documents.
///
/// Soft-deleted descriptors and non-descriptor documents are skipped. Each
/// descriptor is returned with the raw stored document so callers can derive
/// conditional writes from it.
pub(crate) fn parse_collection_documents(
    docs: Vec<DocumentData>,
) -> DbResult<Vec<(DocumentData, CollectionMetadata)>> {
    let mut descriptors = Vec::new();
    for doc in docs {
        if doc.deleted {
            continue;
        }
        let internal = InternalDocument::from_document(&doc)?;
        if let InternalData::Collection(metadata) = internal.data {
            descriptors.push((doc, metadata));
        }
    }
    Ok(descriptors)
}

/// Builds the soft-deletion write for a stored internal document.
pub(crate) fn soft_delete_row(doc: DocumentData) -> WriteRow {
    let mut deleted = doc.clone();
    deleted.deleted = true;
    deleted.revision = create_revision(&deleted.payload, true, Some(&doc.revision));
    deleted.last_write_time = now_millis();
    WriteRow::update(doc, deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidedb_storage::MemoryEngine;

    async fn test_store(engine: &MemoryEngine) -> InstrumentedStore {
        let engine: Arc<dyn StorageEngine> = Arc::new(engine.clone());
        let raw = open_internal_store(&engine, "testdb", &serde_json::Value::Null, false)
            .await
            .unwrap();
        InstrumentedStore::new(raw, Arc::new(IdleQueue::new()))
    }

    fn descriptor(name: &str, version: u32) -> InternalDocument {
        let schema = CollectionSchema::new(version, serde_json::json!({"fields": ["id"]}));
        InternalDocument {
            key: collection_key(name, version),
            data: InternalData::Collection(CollectionMetadata {
                name: name.to_string(),
                schema_hash: schema.hash(),
                schema,
                version,
            }),
        }
    }

    #[test]
    fn descriptor_keys_and_ids() {
        let doc = descriptor("heroes", 2);
        assert_eq!(doc.key, "heroes-2");
        assert_eq!(doc.document_id(), "collection|heroes-2");

        let token = InternalDocument {
            key: STORAGE_TOKEN_KEY.to_string(),
            data: InternalData::StorageToken(StorageTokenData {
                token: "t".to_string(),
            }),
        };
        assert_eq!(token.document_id(), "storage-token|storageToken");
    }

    #[test]
    fn document_roundtrip() {
        let doc = descriptor("heroes", 0);
        let row = doc.clone().into_insert_row().unwrap();
        assert_eq!(row.document.id, "collection|heroes-0");
        assert!(!row.document.deleted);

        let decoded = InternalDocument::from_document(&row.document).unwrap();
        assert_eq!(decoded, doc);
    }

    #[tokio::test]
    async fn first_instance_creates_token_second_adopts_it() {
        let engine = MemoryEngine::new();
        let first = test_store(&engine).await;
        let second = test_store(&engine).await;

        let token_a = ensure_storage_token_exists(&first).await.unwrap();
        let token_b = ensure_storage_token_exists(&second).await.unwrap();
        assert_eq!(token_a, token_b);

        // Re-running on the same store is idempotent.
        let token_c = ensure_storage_token_exists(&first).await.unwrap();
        assert_eq!(token_a, token_c);
    }

    #[tokio::test]
    async fn parse_skips_deleted_and_token_documents() {
        let engine = MemoryEngine::new();
        let store = test_store(&engine).await;
        ensure_storage_token_exists(&store).await.unwrap();

        store
            .bulk_write(vec![
                descriptor("heroes", 0).into_insert_row().unwrap(),
                descriptor("villains", 0).into_insert_row().unwrap(),
            ])
            .await
            .unwrap();

        // Soft-delete one descriptor.
        let docs = store.all_documents().await.unwrap();
        let villains = docs
            .iter()
            .find(|d| d.id == "collection|villains-0")
            .cloned()
            .unwrap();
        let result = store.bulk_write(vec![soft_delete_row(villains)]).await.unwrap();
        assert!(result.is_fully_applied());

        let descriptors =
            parse_collection_documents(store.all_documents().await.unwrap()).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].1.name, "heroes");
    }

    #[tokio::test]
    async fn soft_delete_bumps_revision_height() {
        let doc = descriptor("heroes", 0).into_insert_row().unwrap().document;
        let row = soft_delete_row(doc);
        assert!(row.document.deleted);
        assert!(row.document.revision.starts_with("2-"));
    }
}
