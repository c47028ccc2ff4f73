//! Storage engine and storage instance trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A revisioned document as stored by a storage instance.
///
/// Documents are whole-document units: every write replaces the full
/// document, carrying the revision of the version it was derived from so the
/// instance can detect stale writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Primary key of the document.
    pub id: String,
    /// Opaque document payload.
    pub payload: serde_json::Value,
    /// Soft-deletion flag. Deleted documents stay stored.
    pub deleted: bool,
    /// Content-derived revision string, `"<height>-<hash>"`.
    pub revision: String,
    /// Last-write time in milliseconds since the unix epoch.
    pub last_write_time: u64,
}

/// One row of a conditional bulk write.
#[derive(Debug, Clone)]
pub struct WriteRow {
    /// The document version this write was derived from.
    ///
    /// `None` means the writer believes no document exists under this id yet.
    pub previous: Option<DocumentData>,
    /// The new document state to store.
    pub document: DocumentData,
}

impl WriteRow {
    /// Creates an insert row (no known previous version).
    pub fn insert(document: DocumentData) -> Self {
        Self {
            previous: None,
            document,
        }
    }

    /// Creates an update row derived from a known previous version.
    pub fn update(previous: DocumentData, document: DocumentData) -> Self {
        Self {
            previous: Some(previous),
            document,
        }
    }
}

/// A single row of a bulk write that was rejected as stale.
#[derive(Debug, Clone)]
pub struct WriteConflict {
    /// Id of the document the rejected row targeted.
    pub id: String,
    /// The document currently stored under that id.
    ///
    /// Callers use this to diagnose the conflict or to retry on top of the
    /// winning version.
    pub document_in_db: DocumentData,
}

/// Outcome of a conditional bulk write.
///
/// Bulk writes are best-effort: rows that pass the revision check are applied
/// even when other rows in the same bulk conflict.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteResult {
    /// Documents that were written, in row order.
    pub success: Vec<DocumentData>,
    /// Rows that were rejected because their `previous` revision was stale.
    pub conflicts: Vec<WriteConflict>,
}

impl BulkWriteResult {
    /// Returns true if every row of the bulk was applied.
    #[must_use]
    pub fn is_fully_applied(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Parameters for opening a storage instance.
///
/// A storage instance is addressed by the (database, collection, schema
/// version) triple; engines may use the schema to set up indexes or
/// validation but the orchestrator treats it as opaque.
#[derive(Debug, Clone)]
pub struct InstanceParams {
    /// Name of the owning database.
    pub database_name: String,
    /// Name of the collection this instance stores.
    pub collection_name: String,
    /// The collection's schema definition.
    pub schema: serde_json::Value,
    /// The collection's schema version.
    pub schema_version: u32,
    /// Engine-specific creation options, forwarded verbatim.
    pub options: serde_json::Value,
    /// Whether several same-machine instances may attach to this storage.
    pub multi_instance: bool,
}

/// A pluggable storage engine.
///
/// An engine is a factory for storage instances. Two instances opened with
/// the same (database, collection) pair on the same engine handle must
/// observe the same underlying data; this is what makes multi-instance
/// coordination through shared storage possible.
#[async_trait]
pub trait StorageEngine: Send + Sync + 'static {
    /// A short identifier for the engine, used in logs.
    fn name(&self) -> &'static str;

    /// Whether the engine natively propagates change events across
    /// instances.
    ///
    /// When true, the orchestrator suppresses its own rebroadcast to avoid
    /// delivering every event twice.
    fn broadcasts_changestream(&self) -> bool {
        false
    }

    /// Opens a storage instance for the given parameters.
    async fn create_instance(
        &self,
        params: InstanceParams,
    ) -> StorageResult<Arc<dyn StorageInstance>>;
}

/// One opened storage instance.
///
/// # Invariants
///
/// - `bulk_write` applies each row atomically with respect to its revision
///   check: a row whose `previous` revision does not match the stored
///   document's current revision (including `previous: None` while any
///   document, deleted or not, exists under the id) is reported as a
///   [`WriteConflict`] and leaves the stored document untouched.
/// - `remove` deletes the instance's data from the underlying storage;
///   `close` only detaches this handle.
#[async_trait]
pub trait StorageInstance: Send + Sync {
    /// The collection this instance stores.
    fn collection_name(&self) -> &str;

    /// Performs a conditional bulk write.
    async fn bulk_write(&self, rows: Vec<WriteRow>) -> StorageResult<BulkWriteResult>;

    /// Fetches documents by id. Missing ids are silently skipped.
    async fn find_by_id(&self, ids: &[String]) -> StorageResult<Vec<DocumentData>>;

    /// Returns all stored documents, deleted ones included.
    async fn all_documents(&self) -> StorageResult<Vec<DocumentData>>;

    /// Deletes all data of this instance from the underlying storage.
    async fn remove(&self) -> StorageResult<()>;

    /// Closes this handle without touching the stored data.
    async fn close(&self) -> StorageResult<()>;
}
