//! Optional capabilities.
//!
//! The orchestrator is usable standalone; richer behavior (JSON dump, server
//! spawning, backup, leader election, schema migration) is additive. Each
//! optional feature has a typed slot in the registry; invoking a feature
//! whose slot is empty fails with a stable `capability-not-installed` error
//! naming the missing capability, so callers can tell "extension missing"
//! from a genuine failure.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Capability name for JSON export/import.
pub const CAP_JSON_DUMP: &str = "json-dump";
/// Capability name for server spawning.
pub const CAP_SERVER: &str = "server";
/// Capability name for backups.
pub const CAP_BACKUP: &str = "backup";
/// Capability name for leader election.
pub const CAP_LEADER_ELECTION: &str = "leader-election";
/// Capability name for schema migration.
pub const CAP_MIGRATION: &str = "migration";

/// JSON export/import of a whole database.
#[async_trait]
pub trait JsonDumpCapability: Send + Sync {
    /// Exports the given collections (all when `None`) to a JSON value.
    async fn export_json(
        &self,
        database: &Database,
        collections: Option<&[String]>,
    ) -> DbResult<serde_json::Value>;

    /// Imports a previously exported dump.
    async fn import_json(&self, database: &Database, dump: serde_json::Value) -> DbResult<()>;
}

/// Spawning a server exposing the database.
#[async_trait]
pub trait ServerCapability: Send + Sync {
    /// Spawns a server; the returned value is implementation-defined.
    async fn spawn(
        &self,
        database: &Database,
        options: serde_json::Value,
    ) -> DbResult<serde_json::Value>;
}

/// Database backups.
#[async_trait]
pub trait BackupCapability: Send + Sync {
    /// Runs a backup with implementation-defined options.
    async fn backup(&self, database: &Database, options: serde_json::Value) -> DbResult<()>;
}

/// Leader election across instances sharing storage.
#[async_trait]
pub trait LeaderElectionCapability: Send + Sync {
    /// Whether this instance currently is the leader.
    async fn is_leader(&self, database: &Database) -> bool;

    /// Resolves once this instance becomes leader.
    async fn wait_for_leadership(&self, database: &Database) -> DbResult<()>;
}

/// Schema migration across collection versions.
pub trait MigrationCapability: Send + Sync {
    /// Returns the migration state of every collection, as an
    /// implementation-defined value.
    fn migration_states(&self, database: &Database) -> DbResult<serde_json::Value>;
}

/// The per-database registry of installed capabilities.
#[derive(Default)]
pub struct CapabilityRegistry {
    json_dump: RwLock<Option<Arc<dyn JsonDumpCapability>>>,
    server: RwLock<Option<Arc<dyn ServerCapability>>>,
    backup: RwLock<Option<Arc<dyn BackupCapability>>>,
    leader_election: RwLock<Option<Arc<dyn LeaderElectionCapability>>>,
    migration: RwLock<Option<Arc<dyn MigrationCapability>>>,
}

impl CapabilityRegistry {
    /// Installs the JSON dump capability.
    pub fn install_json_dump(&self, capability: Arc<dyn JsonDumpCapability>) {
        *self.json_dump.write() = Some(capability);
    }

    /// Installs the server capability.
    pub fn install_server(&self, capability: Arc<dyn ServerCapability>) {
        *self.server.write() = Some(capability);
    }

    /// Installs the backup capability.
    pub fn install_backup(&self, capability: Arc<dyn BackupCapability>) {
        *self.backup.write() = Some(capability);
    }

    /// Installs the leader election capability.
    pub fn install_leader_election(&self, capability: Arc<dyn LeaderElectionCapability>) {
        *self.leader_election.write() = Some(capability);
    }

    /// Installs the migration capability.
    pub fn install_migration(&self, capability: Arc<dyn MigrationCapability>) {
        *self.migration.write() = Some(capability);
    }

    pub(crate) fn json_dump(&self) -> DbResult<Arc<dyn JsonDumpCapability>> {
        self.json_dump
            .read()
            .clone()
            .ok_or(DbError::capability_not_installed(CAP_JSON_DUMP))
    }

    pub(crate) fn server(&self) -> DbResult<Arc<dyn ServerCapability>> {
        self.server
            .read()
            .clone()
            .ok_or(DbError::capability_not_installed(CAP_SERVER))
    }

    pub(crate) fn backup(&self) -> DbResult<Arc<dyn BackupCapability>> {
        self.backup
            .read()
            .clone()
            .ok_or(DbError::capability_not_installed(CAP_BACKUP))
    }

    pub(crate) fn leader_election(&self) -> DbResult<Arc<dyn LeaderElectionCapability>> {
        self.leader_election
            .read()
            .clone()
            .ok_or(DbError::capability_not_installed(CAP_LEADER_ELECTION))
    }

    pub(crate) fn migration(&self) -> DbResult<Arc<dyn MigrationCapability>> {
        self.migration
            .read()
            .clone()
            .ok_or(DbError::capability_not_installed(CAP_MIGRATION))
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("json_dump", &self.json_dump.read().is_some())
            .field("server", &self.server.read().is_some())
            .field("backup", &self.backup.read().is_some())
            .field("leader_election", &self.leader_election.read().is_some())
            .field("migration", &self.migration.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capabilities_name_themselves() {
        let registry = CapabilityRegistry::default();
        let err = registry.json_dump().err().unwrap();
        assert_eq!(err.kind(), "capability-not-installed");
        assert!(err.to_string().contains(CAP_JSON_DUMP));

        let err = registry.leader_election().err().unwrap();
        assert!(err.to_string().contains(CAP_LEADER_ELECTION));
    }

    #[test]
    fn installed_capability_is_returned() {
        struct NoopMigration;
        impl MigrationCapability for NoopMigration {
            fn migration_states(&self, _database: &Database) -> DbResult<serde_json::Value> {
                Ok(serde_json::json!([]))
            }
        }

        let registry = CapabilityRegistry::default();
        assert!(registry.migration().is_err());
        registry.install_migration(Arc::new(NoopMigration));
        assert!(registry.migration().is_ok());
    }
}
