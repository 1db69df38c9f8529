//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Request descriptors, classification and strategy selection
//! - Versioned cache store with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod request;
pub mod strategy;

pub use cache::{CacheDb, CacheStorage, CachedEntry, MemoryStore, Namespace, VersionRegistry};
pub use classify::{Classification, Classifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use request::{RequestDescriptor, ResourceType};
pub use strategy::{StrategyDescriptor, StrategyKind, StrategySelector};
