//! Versioned cache store.
//!
//! Entries are response snapshots partitioned into named namespaces, one per
//! release version. Backends:
//!
//! - SQLite via tokio-rusqlite (WAL mode, cascading namespace deletes)
//! - In-memory HashMap for tests and ephemeral runs
//!
//! Executors only see a [`Namespace`] handle; creating and deleting
//! namespaces belongs to the [`VersionRegistry`] and the lifecycle controller.

pub mod connection;
pub mod entries;
pub mod entry;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod namespace;
pub mod registry;
pub mod storage;

pub use crate::Error;

pub use connection::CacheDb;
pub use entry::{CachedEntry, STORED_AT_HEADER};
pub use memory::MemoryStore;
pub use namespace::Namespace;
pub use registry::VersionRegistry;
pub use storage::CacheStorage;
