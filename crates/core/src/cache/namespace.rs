//! Namespace handle given to strategy executors.
//!
//! Reads and writes go through here so the freshness stamp and the
//! store-failure policy are applied in one place: a failed read is a miss,
//! a failed write is logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::entry::CachedEntry;
use super::storage::CacheStorage;
use crate::clock::Clock;
use crate::request::RequestDescriptor;
use crate::Error;

/// A single namespace of the cache store bound to a clock.
#[derive(Clone)]
pub struct Namespace {
    storage: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    name: String,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Namespace {
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>, name: impl Into<String>) -> Self {
        Self { storage, clock, name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up the entry for a request. Store failures read as a miss.
    pub async fn lookup(&self, request: &RequestDescriptor) -> Option<CachedEntry> {
        match self.storage.get(&self.name, &request.cache_key()).await {
            Ok(Some(entry)) => {
                tracing::debug!(namespace = %self.name, url = %request.url(), "cache hit");
                Some(entry)
            }
            Ok(None) => {
                tracing::debug!(namespace = %self.name, url = %request.url(), "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(namespace = %self.name, url = %request.url(), error = %e, "cache read failed");
                None
            }
        }
    }

    /// Stamp and write a successful response, replacing any existing entry.
    ///
    /// Non-2xx responses are skipped. Returns whether the entry was written.
    pub async fn store(&self, request: &RequestDescriptor, entry: CachedEntry) -> bool {
        if !entry.is_success() {
            tracing::debug!(url = %request.url(), status = entry.status, "not caching unsuccessful response");
            return false;
        }
        match self.put(request, entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(namespace = %self.name, url = %request.url(), error = %e, "cache write failed");
                false
            }
        }
    }

    /// Stamp and write an entry, surfacing store failures.
    pub async fn put(&self, request: &RequestDescriptor, entry: CachedEntry) -> Result<(), Error> {
        let entry = entry.stamped(self.clock.now());
        self.storage.put(&self.name, &request.cache_key(), &entry).await
    }

    /// Create the namespace in the backing store if it doesn't exist yet.
    pub async fn open(&self) -> Result<(), Error> {
        self.storage.open(&self.name).await
    }

    pub async fn count(&self) -> Result<usize, Error> {
        self.storage.count(&self.name).await
    }
}
