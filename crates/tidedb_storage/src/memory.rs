//! In-memory storage engine.

use crate::engine::{
    BulkWriteResult, DocumentData, InstanceParams, StorageEngine, StorageInstance, WriteConflict,
    WriteRow,
};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory storage engine.
///
/// The engine handle is cheaply cloneable; all clones share the same stored
/// data. Instances opened for the same (database, collection) pair observe
/// the same documents, which makes this engine suitable as the shared-storage
/// substrate for multi-instance tests and ephemeral databases.
///
/// # Example
///
/// ```rust,ignore
/// use tidedb_storage::MemoryEngine;
///
/// let engine = MemoryEngine::new();
/// // Hand clones of `engine` to every database instance that should
/// // see the same data.
/// let same_storage = engine.clone();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    collections: Arc<Mutex<HashMap<String, Arc<CollectionState>>>>,
}

#[derive(Debug, Default)]
struct CollectionState {
    docs: RwLock<BTreeMap<String, DocumentData>>,
}

impl MemoryEngine {
    /// Creates a new empty in-memory engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live collection stores.
    ///
    /// Useful for asserting that removal actually dropped the data.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.lock().len()
    }

    fn state_key(database_name: &str, collection_name: &str) -> String {
        format!("{database_name}/{collection_name}")
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_instance(
        &self,
        params: InstanceParams,
    ) -> StorageResult<Arc<dyn StorageInstance>> {
        let key = Self::state_key(&params.database_name, &params.collection_name);
        let state = Arc::clone(
            self.collections
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CollectionState::default())),
        );
        Ok(Arc::new(MemoryInstance {
            key,
            params,
            state,
            engine: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A storage instance backed by [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryInstance {
    key: String,
    params: InstanceParams,
    state: Arc<CollectionState>,
    engine: MemoryEngine,
    closed: AtomicBool,
}

impl MemoryInstance {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::closed(
                &self.params.database_name,
                &self.params.collection_name,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageInstance for MemoryInstance {
    fn collection_name(&self) -> &str {
        &self.params.collection_name
    }

    async fn bulk_write(&self, rows: Vec<WriteRow>) -> StorageResult<BulkWriteResult> {
        self.ensure_open()?;
        let mut docs = self.state.docs.write();
        let mut result = BulkWriteResult::default();
        for row in rows {
            let stored = docs.get(&row.document.id);
            let stale = match (stored, &row.previous) {
                // Nothing stored: any write applies.
                (None, _) => false,
                // Document exists but the writer assumed none did.
                (Some(stored), None) => {
                    result.conflicts.push(WriteConflict {
                        id: stored.id.clone(),
                        document_in_db: stored.clone(),
                    });
                    true
                }
                (Some(stored), Some(previous)) => {
                    if stored.revision == previous.revision {
                        false
                    } else {
                        result.conflicts.push(WriteConflict {
                            id: stored.id.clone(),
                            document_in_db: stored.clone(),
                        });
                        true
                    }
                }
            };
            if !stale {
                docs.insert(row.document.id.clone(), row.document.clone());
                result.success.push(row.document);
            }
        }
        Ok(result)
    }

    async fn find_by_id(&self, ids: &[String]) -> StorageResult<Vec<DocumentData>> {
        self.ensure_open()?;
        let docs = self.state.docs.read();
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn all_documents(&self) -> StorageResult<Vec<DocumentData>> {
        self.ensure_open()?;
        Ok(self.state.docs.read().values().cloned().collect())
    }

    async fn remove(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.state.docs.write().clear();
        self.engine.collections.lock().remove(&self.key);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, revision: &str) -> DocumentData {
        DocumentData {
            id: id.to_string(),
            payload: serde_json::json!({ "value": id }),
            deleted: false,
            revision: revision.to_string(),
            last_write_time: 0,
        }
    }

    fn params(collection: &str) -> InstanceParams {
        InstanceParams {
            database_name: "testdb".to_string(),
            collection_name: collection.to_string(),
            schema: serde_json::json!({}),
            schema_version: 0,
            options: serde_json::Value::Null,
            multi_instance: false,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();

        let result = instance
            .bulk_write(vec![WriteRow::insert(doc("a", "1-x"))])
            .await
            .unwrap();
        assert!(result.is_fully_applied());

        let found = instance.find_by_id(&["a".to_string()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].revision, "1-x");
    }

    #[tokio::test]
    async fn insert_over_existing_conflicts() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();

        instance
            .bulk_write(vec![WriteRow::insert(doc("a", "1-x"))])
            .await
            .unwrap();
        let result = instance
            .bulk_write(vec![WriteRow::insert(doc("a", "1-y"))])
            .await
            .unwrap();

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].document_in_db.revision, "1-x");
        // Stored document is unchanged.
        let found = instance.find_by_id(&["a".to_string()]).await.unwrap();
        assert_eq!(found[0].revision, "1-x");
    }

    #[tokio::test]
    async fn stale_update_conflicts_fresh_update_applies() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();

        let first = doc("a", "1-x");
        instance
            .bulk_write(vec![WriteRow::insert(first.clone())])
            .await
            .unwrap();

        let stale = instance
            .bulk_write(vec![WriteRow::update(doc("a", "1-stale"), doc("a", "2-y"))])
            .await
            .unwrap();
        assert_eq!(stale.conflicts.len(), 1);

        let fresh = instance
            .bulk_write(vec![WriteRow::update(first, doc("a", "2-y"))])
            .await
            .unwrap();
        assert!(fresh.is_fully_applied());
    }

    #[tokio::test]
    async fn conflict_against_deleted_document() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();

        let mut deleted = doc("a", "2-gone");
        deleted.deleted = true;
        instance
            .bulk_write(vec![WriteRow::insert(deleted)])
            .await
            .unwrap();

        // Soft-deleted documents still occupy the id.
        let result = instance
            .bulk_write(vec![WriteRow::insert(doc("a", "1-new"))])
            .await
            .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert!(result.conflicts[0].document_in_db.deleted);
    }

    #[tokio::test]
    async fn partial_bulk_applies_non_conflicting_rows() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();

        instance
            .bulk_write(vec![WriteRow::insert(doc("a", "1-x"))])
            .await
            .unwrap();
        let result = instance
            .bulk_write(vec![
                WriteRow::insert(doc("a", "1-dupe")),
                WriteRow::insert(doc("b", "1-ok")),
            ])
            .await
            .unwrap();

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.success.len(), 1);
        assert_eq!(result.success[0].id, "b");
    }

    #[tokio::test]
    async fn instances_share_data_per_collection() {
        let engine = MemoryEngine::new();
        let a = engine.create_instance(params("docs")).await.unwrap();
        let b = engine.clone().create_instance(params("docs")).await.unwrap();

        a.bulk_write(vec![WriteRow::insert(doc("a", "1-x"))])
            .await
            .unwrap();
        let seen = b.all_documents().await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_data_close_does_not() {
        let engine = MemoryEngine::new();
        let a = engine.create_instance(params("docs")).await.unwrap();
        a.bulk_write(vec![WriteRow::insert(doc("a", "1-x"))])
            .await
            .unwrap();
        a.close().await.unwrap();
        assert_eq!(engine.collection_count(), 1);

        let b = engine.create_instance(params("docs")).await.unwrap();
        assert_eq!(b.all_documents().await.unwrap().len(), 1);
        b.remove().await.unwrap();
        assert_eq!(engine.collection_count(), 0);

        let c = engine.create_instance(params("docs")).await.unwrap();
        assert!(c.all_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_instance_rejects_operations() {
        let engine = MemoryEngine::new();
        let instance = engine.create_instance(params("docs")).await.unwrap();
        instance.close().await.unwrap();

        let result = instance.all_documents().await;
        assert!(matches!(result, Err(StorageError::Closed { .. })));
    }
}
