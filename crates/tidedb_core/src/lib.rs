//! # TideDB Core
//!
//! Orchestration core of a local-first reactive database.
//!
//! This crate provides:
//! - The [`Database`] orchestrator: named, versioned collections over a
//!   pluggable storage engine
//! - The internal metadata store with revisioned collection descriptors
//! - A deduplicating change [`EventBus`] merged into one ordered stream
//! - The multi-instance channel synchronizing change events across
//!   same-machine instances sharing storage
//! - An [`IdleQueue`] sequencing teardown behind in-flight work
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidedb_core::{create_database, CollectionSchema, DatabaseOptions};
//! use tidedb_storage::{MemoryEngine, StorageEngine};
//!
//! let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
//! let db = create_database(engine, DatabaseOptions::new("heroes-db")).await?;
//! db.add_collections([(
//!     "heroes".to_string(),
//!     CollectionSchema::new(0, serde_json::json!({"fields": ["name"]})).into(),
//! )])
//! .await?;
//! db.destroy().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capability;
mod channel;
mod collection;
mod database;
mod error;
mod event;
mod hooks;
mod idle;
mod internal_store;
mod revision;
mod schema;

pub use capability::{
    BackupCapability, CapabilityRegistry, JsonDumpCapability, LeaderElectionCapability,
    MigrationCapability, ServerCapability, CAP_BACKUP, CAP_JSON_DUMP, CAP_LEADER_ELECTION,
    CAP_MIGRATION, CAP_SERVER,
};
pub use channel::{InstanceChannel, LocalChannel};
pub use collection::{Collection, CollectionCreator};
pub use database::{
    create_database, database_count, remove_database, Database, DatabaseOptions,
};
pub use error::{DbError, DbResult};
pub use event::{
    ChangeEvent, ChangeEventBulk, ChangeOperation, EventBus, EventStream,
    EVENT_BULK_ID_RETENTION,
};
pub use hooks::{clear_hooks, register_hook, HookContext, HookPoint};
pub use idle::IdleQueue;
pub use internal_store::{
    collection_key, internal_store_schema, CollectionMetadata, InstrumentedStore, InternalData,
    InternalDocument, StorageTokenData, INTERNAL_STORE_COLLECTION, STORAGE_TOKEN_KEY,
};
pub use revision::{create_revision, now_millis, revision_height, DEFAULT_REVISION_HEIGHT};
pub use schema::CollectionSchema;
