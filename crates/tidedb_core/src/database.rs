//! Database orchestrator.
//!
//! A [`Database`] is a single-process handle over a set of named, versioned
//! collections backed by a pluggable storage engine. It owns the internal
//! metadata store, the change event bus, the idle queue, and (when
//! multi-instance) the channel connecting it to other instances attached to
//! the same storage.
//!
//! Change events created by this instance flow
//! collection -> [`Database::emit_bulk`] -> bus -> channel; events created by
//! other instances flow channel -> [`Database::emit_bulk`] -> bus.

use crate::capability::CapabilityRegistry;
use crate::channel::{InstanceChannel, LocalChannel};
use crate::collection::{Collection, CollectionCreator};
use crate::error::{DbError, DbResult};
use crate::event::{ChangeEventBulk, EventBus, EventStream};
use crate::hooks::{run_hooks, HookContext, HookPoint};
use crate::idle::IdleQueue;
use crate::internal_store::{
    collection_key, ensure_storage_token_exists, open_internal_store, parse_collection_documents,
    soft_delete_row, CollectionMetadata, InstrumentedStore, InternalData, InternalDocument,
};
use crate::schema::CollectionSchema;
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use tidedb_storage::{InstanceParams, StorageEngine, WriteRow};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Minimum accepted password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Names of databases currently live in this process.
///
/// Populated on successful creation, cleared when an instance is destroyed.
/// Guards against two live handles accidentally opening the same name.
static USED_DATABASE_NAMES: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Number of live database instances in this process.
static LIVE_INSTANCE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Returns the number of live database instances in this process.
#[must_use]
pub fn database_count() -> usize {
    LIVE_INSTANCE_COUNT.load(Ordering::SeqCst)
}

type StorageTokenFuture = Shared<BoxFuture<'static, Result<String, Arc<DbError>>>>;

/// Options for creating a database.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Database name, the unit of process-wide uniqueness.
    pub name: String,
    /// Engine-specific instance creation options, forwarded verbatim.
    pub instance_options: serde_json::Value,
    /// Password; required when any collection schema requests encryption.
    pub password: Option<String>,
    /// Whether other same-machine instances may attach to the same storage.
    pub multi_instance: bool,
    /// Forwarded to collections; unused by the core itself.
    pub event_reduce: bool,
    /// Suppresses the process-wide name uniqueness check.
    pub ignore_duplicate: bool,
    /// Opaque application options carried on the handle.
    pub options: serde_json::Value,
    /// Opaque cleanup policy carried on the handle.
    pub cleanup_policy: Option<serde_json::Value>,
    /// Forwarded to collections; unused by the core itself.
    pub local_documents: bool,
}

impl DatabaseOptions {
    /// Creates options with the defaults: multi-instance on, everything else
    /// off.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_options: serde_json::Value::Null,
            password: None,
            multi_instance: true,
            event_reduce: false,
            ignore_duplicate: false,
            options: serde_json::Value::Null,
            cleanup_policy: None,
            local_documents: false,
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the multi-instance flag.
    #[must_use]
    pub fn multi_instance(mut self, multi_instance: bool) -> Self {
        self.multi_instance = multi_instance;
        self
    }

    /// Sets the ignore-duplicate flag.
    #[must_use]
    pub fn ignore_duplicate(mut self, ignore_duplicate: bool) -> Self {
        self.ignore_duplicate = ignore_duplicate;
        self
    }

    /// Sets the event-reduce flag.
    #[must_use]
    pub fn event_reduce(mut self, event_reduce: bool) -> Self {
        self.event_reduce = event_reduce;
        self
    }

    /// Sets the local-documents flag.
    #[must_use]
    pub fn local_documents(mut self, local_documents: bool) -> Self {
        self.local_documents = local_documents;
        self
    }

    /// Sets the engine-specific instance creation options.
    #[must_use]
    pub fn instance_options(mut self, instance_options: serde_json::Value) -> Self {
        self.instance_options = instance_options;
        self
    }

    /// Sets the opaque application options.
    #[must_use]
    pub fn options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Sets the opaque cleanup policy.
    #[must_use]
    pub fn cleanup_policy(mut self, cleanup_policy: serde_json::Value) -> Self {
        self.cleanup_policy = Some(cleanup_policy);
        self
    }
}

/// A live database instance.
pub struct Database {
    name: String,
    engine: Arc<dyn StorageEngine>,
    instance_options: serde_json::Value,
    password: Option<String>,
    multi_instance: bool,
    event_reduce: bool,
    options: serde_json::Value,
    cleanup_policy: Option<serde_json::Value>,
    local_documents: bool,
    /// Random token distinguishing this instance from others attached to the
    /// same storage.
    instance_token: String,
    destroyed: AtomicBool,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    internal_store: Arc<InstrumentedStore>,
    idle_queue: Arc<IdleQueue>,
    events: EventBus,
    channel: Option<Arc<dyn InstanceChannel>>,
    storage_token: StorageTokenFuture,
    capabilities: CapabilityRegistry,
    /// Background tasks owned by this instance: the storage-token warmup and
    /// the channel listener. Aborted during destroy.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Creates a database instance.
///
/// Fails with `duplicate-database-name` when a live instance of the same
/// name exists in this process and `ignore_duplicate` is not set. The
/// storage token is written in the background; construction does not wait
/// for it since it is not on the startup critical path.
pub async fn create_database(
    engine: Arc<dyn StorageEngine>,
    options: DatabaseOptions,
) -> DbResult<Arc<Database>> {
    run_hooks(
        HookPoint::PreCreateDatabase,
        &HookContext::database(&options.name),
    );

    if let Some(password) = &options.password {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(DbError::invalid_password(format!(
                "password must have at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
    }

    {
        let mut used = USED_DATABASE_NAMES.lock();
        if !options.ignore_duplicate && used.contains(&options.name) {
            return Err(DbError::duplicate_database_name(&options.name));
        }
        used.insert(options.name.clone());
    }

    let channel: Option<Arc<dyn InstanceChannel>> = if options.multi_instance {
        Some(Arc::new(LocalChannel::open(format!(
            "tidedb:{}:socket",
            options.name
        ))))
    } else {
        None
    };
    let idle_queue = Arc::new(IdleQueue::new());

    let raw_store = match open_internal_store(
        &engine,
        &options.name,
        &options.instance_options,
        options.multi_instance,
    )
    .await
    {
        Ok(store) => store,
        Err(err) => {
            // A failed creation must not poison the name for later attempts.
            USED_DATABASE_NAMES.lock().remove(&options.name);
            if let Some(channel) = &channel {
                let _ = channel.close().await;
            }
            return Err(err);
        }
    };
    let internal_store = Arc::new(InstrumentedStore::new(raw_store, Arc::clone(&idle_queue)));

    // Start persisting the storage token without blocking construction.
    let token_store = Arc::clone(&internal_store);
    let storage_token: StorageTokenFuture = async move {
        ensure_storage_token_exists(&token_store)
            .await
            .map_err(Arc::new)
    }
    .boxed()
    .shared();
    let warmup = tokio::spawn(storage_token.clone().map(|_| ()));

    let database = Arc::new(Database {
        instance_token: Uuid::new_v4().to_string(),
        name: options.name.clone(),
        engine,
        instance_options: options.instance_options,
        password: options.password,
        multi_instance: options.multi_instance,
        event_reduce: options.event_reduce,
        options: options.options,
        cleanup_policy: options.cleanup_policy,
        local_documents: options.local_documents,
        destroyed: AtomicBool::new(false),
        collections: RwLock::new(HashMap::new()),
        internal_store,
        idle_queue,
        events: EventBus::new(),
        channel,
        storage_token,
        capabilities: CapabilityRegistry::default(),
        tasks: Mutex::new(vec![warmup]),
    });
    LIVE_INSTANCE_COUNT.fetch_add(1, Ordering::SeqCst);

    if database.multi_instance {
        spawn_channel_listener(&database);
    }

    tracing::debug!(
        name = %database.name,
        engine = database.engine.name(),
        multi_instance = database.multi_instance,
        "created database instance"
    );
    run_hooks(
        HookPoint::PostCreateDatabase,
        &HookContext::database(&database.name),
    );
    Ok(database)
}

/// Feeds bulks arriving over the channel back into the local bus, filtered
/// by storage-state and origin tokens.
fn spawn_channel_listener(database: &Arc<Database>) {
    let channel = match &database.channel {
        Some(channel) => Arc::clone(channel),
        None => return,
    };
    let mut incoming = channel.subscribe();
    let weak = Arc::downgrade(database);
    let listener = tokio::spawn(async move {
        while let Some(bulk) = incoming.recv().await {
            let Some(database) = weak.upgrade() else {
                break;
            };
            if database.is_destroyed() {
                break;
            }
            let Ok(local_token) = database.storage_token().await else {
                continue;
            };
            if bulk.storage_token.as_deref() != Some(local_token.as_str()) {
                tracing::trace!(
                    bulk_id = %bulk.id,
                    "dropping bulk from foreign storage state"
                );
                continue;
            }
            if bulk.instance_token == database.instance_token {
                // Echo of our own send.
                continue;
            }
            database.emit_bulk(bulk);
        }
    });
    database.tasks.lock().push(listener);
}

impl Database {
    /// The database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage engine this database runs on.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// This instance's random token.
    #[must_use]
    pub fn instance_token(&self) -> &str {
        &self.instance_token
    }

    /// Whether this instance participates in multi-instance coordination.
    #[must_use]
    pub fn multi_instance(&self) -> bool {
        self.multi_instance
    }

    /// The event-reduce flag, forwarded to collections.
    #[must_use]
    pub fn event_reduce(&self) -> bool {
        self.event_reduce
    }

    /// The local-documents flag, forwarded to collections.
    #[must_use]
    pub fn local_documents(&self) -> bool {
        self.local_documents
    }

    /// The opaque application options.
    #[must_use]
    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    /// The opaque cleanup policy, if any.
    #[must_use]
    pub fn cleanup_policy(&self) -> Option<&serde_json::Value> {
        self.cleanup_policy.as_ref()
    }

    /// Whether a password was set at creation.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Whether this instance was destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// The capability registry of this instance.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Looks up a registered collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Names of all registered collections.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// The storage token persisted for the physical storage this instance is
    /// attached to.
    ///
    /// Resolves once the background write started at creation completes; all
    /// instances attached to the same storage observe the same value.
    pub async fn storage_token(&self) -> DbResult<String> {
        self.storage_token
            .clone()
            .await
            .map_err(DbError::StorageToken)
    }

    /// Subscribes to accepted event bulks. `None` once destroyed.
    #[must_use]
    pub fn event_bulks(&self) -> Option<broadcast::Receiver<ChangeEventBulk>> {
        self.events.subscribe_bulks()
    }

    /// Subscribes to the merged stream of individual change events. `None`
    /// once destroyed.
    #[must_use]
    pub fn events(&self) -> Option<EventStream> {
        self.events.subscribe()
    }

    /// Accepts a change-event bulk into this instance.
    ///
    /// This is the single entry point for change events: bulks produced by
    /// this instance's collections as well as bulks received from other
    /// instances all pass through here. Duplicate bulk ids within the
    /// retention window are dropped; newly accepted bulks are offered to the
    /// multi-instance channel for rebroadcast. Returns whether the bulk was
    /// newly accepted.
    pub fn emit_bulk(self: &Arc<Self>, bulk: ChangeEventBulk) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if !self.events.accept(bulk.clone()) {
            return false;
        }
        let database = Arc::clone(self);
        tokio::spawn(async move { database.rebroadcast(bulk).await });
        true
    }

    /// Rebroadcasts a locally accepted bulk onto the channel, when all
    /// policy guards pass.
    async fn rebroadcast(&self, bulk: ChangeEventBulk) {
        if self.is_destroyed() {
            return;
        }
        let channel = match &self.channel {
            Some(channel) => channel,
            None => return,
        };
        // The engine transporting its own changestream would double-deliver.
        if self.engine.broadcasts_changestream() || !self.multi_instance {
            return;
        }
        if bulk.internal {
            return;
        }
        // Only the originating instance rebroadcasts its own writes.
        if bulk.instance_token != self.instance_token {
            return;
        }
        let Ok(local_token) = self.storage_token().await else {
            return;
        };
        if bulk.storage_token.as_deref() != Some(local_token.as_str()) {
            tracing::trace!(
                bulk_id = %bulk.id,
                "not rebroadcasting bulk with mismatched storage token"
            );
            return;
        }
        if let Err(err) = channel.post(bulk).await {
            tracing::warn!(error = %err, "failed to rebroadcast event bulk");
        }
    }

    /// Adds collections to this instance in one bulk operation.
    ///
    /// For each entry the schema's encryption requirement is checked against
    /// the database password (`missing-password`) and the name against
    /// already-registered collections (`duplicate-collection`). One
    /// descriptor per entry is staged into a single conditional bulk write;
    /// a write conflict means a descriptor for that name and version already
    /// exists, which is fine when the schema hashes match (idempotent
    /// re-open) and a `schema-mismatch` failure when they differ.
    ///
    /// There is no rollback: entries written before a schema mismatch is
    /// detected stay persisted.
    pub async fn add_collections<I>(
        &self,
        creators: I,
    ) -> DbResult<HashMap<String, Arc<Collection>>>
    where
        I: IntoIterator<Item = (String, CollectionCreator)>,
    {
        let mut staged: Vec<(String, CollectionCreator)> = Vec::new();
        let mut rows: Vec<WriteRow> = Vec::new();

        for (name, creator) in creators {
            let schema = &creator.schema;
            if schema.encrypted && self.password.is_none() {
                return Err(DbError::missing_password(&name));
            }
            if self.collections.read().contains_key(&name)
                || staged.iter().any(|(staged_name, _)| *staged_name == name)
            {
                return Err(DbError::duplicate_collection(&name));
            }
            run_hooks(
                HookPoint::PreCreateCollection,
                &HookContext::collection(&self.name, &name),
            );

            let descriptor = InternalDocument {
                key: collection_key(&name, schema.version),
                data: InternalData::Collection(CollectionMetadata {
                    name: name.clone(),
                    schema_hash: schema.hash(),
                    schema: schema.clone(),
                    version: schema.version,
                }),
            };
            rows.push(descriptor.into_insert_row()?);
            staged.push((name, creator));
        }

        let write_result = self.internal_store.bulk_write(rows).await?;
        for conflict in &write_result.conflicts {
            let existing = InternalDocument::from_document(&conflict.document_in_db)?;
            let InternalData::Collection(existing) = existing.data else {
                return Err(DbError::invariant_violation(format!(
                    "descriptor slot {} holds a non-collection document",
                    conflict.id
                )));
            };
            let (_, requested) = staged
                .iter()
                .find(|(name, _)| *name == existing.name)
                .ok_or_else(|| {
                    DbError::invariant_violation(format!(
                        "conflict for unknown collection {}",
                        existing.name
                    ))
                })?;
            let requested_hash = requested.schema.hash();
            if existing.schema_hash != requested_hash {
                return Err(DbError::SchemaMismatch {
                    collection: existing.name.clone(),
                    previous_schema_hash: existing.schema_hash.clone(),
                    schema_hash: requested_hash,
                    previous_schema: serde_json::to_value(&existing.schema)?,
                    schema: serde_json::to_value(&requested.schema)?,
                });
            }
            // Same hash: an instance already registered this collection
            // version, re-opening it is idempotent.
        }

        let created = try_join_all(staged.into_iter().map(|(name, creator)| async move {
            let storage = self
                .idle_queue
                .wrap_call(self.engine.create_instance(InstanceParams {
                    database_name: self.name.clone(),
                    collection_name: name.clone(),
                    schema: serde_json::to_value(&creator.schema)?,
                    schema_version: creator.schema.version,
                    options: self.instance_options.clone(),
                    multi_instance: self.multi_instance,
                }))
                .await?;
            let collection = Arc::new(Collection::new(
                name.clone(),
                creator.schema,
                storage,
                creator.options,
            ));
            Ok::<_, DbError>((name, collection))
        }))
        .await?;

        let mut result = HashMap::new();
        let mut registered = self.collections.write();
        for (name, collection) in created {
            tracing::debug!(database = %self.name, collection = %name, "added collection");
            registered.insert(name.clone(), Arc::clone(&collection));
            result.insert(name, collection);
        }
        Ok(result)
    }

    /// Removes a collection and the stored data of all its schema versions.
    ///
    /// Destroys the live handle if one is registered, soft-deletes every
    /// descriptor whose name matches, and removes the storage instance of
    /// every known version in parallel. Idempotent once no descriptors
    /// remain.
    pub async fn remove_collection(&self, collection_name: &str) -> DbResult<()> {
        let live = self.collections.write().remove(collection_name);
        if let Some(collection) = live {
            collection.destroy().await?;
        }

        let docs = self.internal_store.all_documents().await?;
        let matching: Vec<_> = parse_collection_documents(docs)?
            .into_iter()
            .filter(|(_, metadata)| metadata.name == collection_name)
            .collect();

        let delete_rows = matching
            .iter()
            .map(|(doc, _)| soft_delete_row(doc.clone()))
            .collect::<Vec<_>>();
        if !delete_rows.is_empty() {
            let result = self.internal_store.bulk_write(delete_rows).await?;
            if !result.is_fully_applied() {
                tracing::warn!(
                    database = %self.name,
                    collection = collection_name,
                    conflicts = result.conflicts.len(),
                    "some descriptors were soft-deleted concurrently"
                );
            }
        }

        try_join_all(matching.iter().map(|(_, metadata)| async {
            let storage = self
                .idle_queue
                .wrap_call(self.engine.create_instance(InstanceParams {
                    database_name: self.name.clone(),
                    collection_name: metadata.name.clone(),
                    schema: serde_json::to_value(&metadata.schema)?,
                    schema_version: metadata.version,
                    options: self.instance_options.clone(),
                    multi_instance: self.multi_instance,
                }))
                .await?;
            storage.remove().await?;
            Ok::<_, DbError>(())
        }))
        .await?;

        tracing::debug!(
            database = %self.name,
            collection = collection_name,
            versions = matching.len(),
            "removed collection"
        );
        run_hooks(
            HookPoint::PostRemoveCollection,
            &HookContext::collection(&self.name, collection_name),
        );
        Ok(())
    }

    /// Soft-deletes the descriptor of one collection version.
    ///
    /// Fails with `invariant-violation` when the descriptor does not exist;
    /// a caller asking to delete a descriptor it never wrote signals a bug.
    pub async fn remove_collection_doc(
        &self,
        collection_name: &str,
        schema: &CollectionSchema,
    ) -> DbResult<()> {
        let id = format!(
            "collection|{}",
            collection_key(collection_name, schema.version)
        );
        let docs = self.internal_store.find_by_id(&[id.clone()]).await?;
        let doc = docs.into_iter().next().ok_or_else(|| {
            DbError::invariant_violation(format!("missing collection descriptor {id}"))
        })?;
        self.internal_store
            .bulk_write(vec![soft_delete_row(doc)])
            .await?;
        Ok(())
    }

    /// Runs an operation while tracking it as in flight on the idle queue.
    pub async fn locked_run<F: std::future::Future>(&self, operation: F) -> F::Output {
        self.idle_queue.wrap_call(operation).await
    }

    /// Resolves once no tracked operation is in flight.
    pub async fn request_idle(&self) {
        self.idle_queue.request_idle().await;
    }

    /// Destroys this instance: detaches all collections and releases every
    /// resource, leaving stored data intact.
    ///
    /// Idempotent; only the first call tears down and returns true. The
    /// destroyed flag is set before anything else so concurrent callers and
    /// event producers observe it immediately. When part of the teardown
    /// fails, the first error is reported but the name registration and the
    /// channel are still released.
    pub async fn destroy(&self) -> DbResult<bool> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        run_hooks(
            HookPoint::PreDestroyDatabase,
            &HookContext::database(&self.name),
        );

        // Release subscribers first so nobody observes a half-torn-down
        // instance.
        self.events.close();
        LIVE_INSTANCE_COUNT.fetch_sub(1, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        self.request_idle().await;

        let collections: Vec<Arc<Collection>> =
            self.collections.write().drain().map(|(_, c)| c).collect();
        let mut failure = try_join_all(collections.iter().map(|collection| collection.destroy()))
            .await
            .err();
        if let Err(err) = self.internal_store.close().await {
            failure.get_or_insert(err);
        }
        // Even a failed teardown releases the channel and the name; the
        // instance is unusable either way and the name must stay creatable.
        if let Some(channel) = &self.channel {
            if let Err(err) = channel.close().await {
                failure.get_or_insert(err);
            }
        }
        USED_DATABASE_NAMES.lock().remove(&self.name);
        match failure {
            Some(err) => Err(err),
            None => {
                tracing::debug!(name = %self.name, "destroyed database instance");
                Ok(true)
            }
        }
    }

    /// Destroys this instance and removes all of its stored data.
    pub async fn remove(&self) -> DbResult<()> {
        self.destroy().await?;
        remove_database(&self.name, &self.engine).await
    }

    /// Exports the database as JSON. Requires the `json-dump` capability.
    pub async fn export_json(
        &self,
        collections: Option<&[String]>,
    ) -> DbResult<serde_json::Value> {
        self.capabilities
            .json_dump()?
            .export_json(self, collections)
            .await
    }

    /// Imports a previously exported dump. Requires the `json-dump`
    /// capability.
    pub async fn import_json(&self, dump: serde_json::Value) -> DbResult<()> {
        self.capabilities.json_dump()?.import_json(self, dump).await
    }

    /// Spawns a server exposing this database. Requires the `server`
    /// capability.
    pub async fn server(&self, options: serde_json::Value) -> DbResult<serde_json::Value> {
        self.capabilities.server()?.spawn(self, options).await
    }

    /// Runs a backup. Requires the `backup` capability.
    pub async fn backup(&self, options: serde_json::Value) -> DbResult<()> {
        self.capabilities.backup()?.backup(self, options).await
    }

    /// Returns the leader elector. Requires the `leader-election`
    /// capability.
    pub fn leader_elector(
        &self,
    ) -> DbResult<Arc<dyn crate::capability::LeaderElectionCapability>> {
        self.capabilities.leader_election()
    }

    /// Whether this instance is the leader. Requires the `leader-election`
    /// capability.
    pub async fn is_leader(&self) -> DbResult<bool> {
        Ok(self.capabilities.leader_election()?.is_leader(self).await)
    }

    /// Resolves once this instance becomes leader. Requires the
    /// `leader-election` capability.
    pub async fn wait_for_leadership(&self) -> DbResult<()> {
        self.capabilities
            .leader_election()?
            .wait_for_leadership(self)
            .await
    }

    /// Returns the migration state of every collection. Requires the
    /// `migration` capability.
    pub fn migration_states(&self) -> DbResult<serde_json::Value> {
        self.capabilities.migration()?.migration_states(self)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("engine", &self.engine.name())
            .field("multi_instance", &self.multi_instance)
            .field("destroyed", &self.is_destroyed())
            .field("collections", &self.collection_names())
            .finish_non_exhaustive()
    }
}

/// Removes a database's stored data without needing a live instance.
///
/// Opens the internal metadata store for the name, removes the storage
/// instance behind every known (collection, schema version) descriptor, and
/// finally removes the metadata store itself. Also the implementation behind
/// [`Database::remove`].
pub async fn remove_database(
    database_name: &str,
    engine: &Arc<dyn StorageEngine>,
) -> DbResult<()> {
    let store = open_internal_store(engine, database_name, &serde_json::Value::Null, false).await?;
    let descriptors = parse_collection_documents(store.all_documents().await?)?;

    try_join_all(descriptors.iter().map(|(_, metadata)| async {
        let instance = engine
            .create_instance(InstanceParams {
                database_name: database_name.to_string(),
                collection_name: metadata.name.clone(),
                schema: serde_json::to_value(&metadata.schema)?,
                schema_version: metadata.version,
                options: serde_json::Value::Null,
                multi_instance: false,
            })
            .await?;
        instance.remove().await?;
        Ok::<_, DbError>(())
    }))
    .await?;

    run_hooks(
        HookPoint::PostRemoveDatabase,
        &HookContext::database(database_name),
    );
    store.remove().await?;
    tracing::debug!(
        name = database_name,
        collections = descriptors.len(),
        "removed database data"
    );
    Ok(())
}
