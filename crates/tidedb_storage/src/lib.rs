//! # TideDB Storage
//!
//! Storage engine seam for TideDB.
//!
//! This crate defines the pluggable storage contract:
//! - [`StorageEngine`] - a factory for per-collection storage instances
//! - [`StorageInstance`] - revisioned whole-document storage with
//!   conditional bulk writes
//! - [`MemoryEngine`] - an in-memory engine for tests and ephemeral
//!   databases
//!
//! Engines are opaque to the database core: the core never interprets
//! payloads, it only relies on the revision-conflict contract documented on
//! [`StorageInstance::bulk_write`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod memory;

pub use engine::{
    BulkWriteResult, DocumentData, InstanceParams, StorageEngine, StorageInstance, WriteConflict,
    WriteRow,
};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryEngine, MemoryInstance};
