//! Storage backend abstraction for the cache store.

use super::entry::CachedEntry;
use crate::Error;

/// A process-wide store of named namespaces, each mapping keys to entries.
///
/// Operations are atomic per key. Concurrent writers to the same key are
/// allowed and the last write wins. Writing into a namespace that does not
/// exist creates it.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the namespace if it doesn't exist.
    async fn open(&self, namespace: &str) -> Result<(), Error>;

    /// Names of all existing namespaces.
    async fn namespaces(&self) -> Result<Vec<String>, Error>;

    /// Delete a namespace with all of its entries.
    ///
    /// Returns false if the namespace didn't exist.
    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error>;

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedEntry>, Error>;

    /// Insert or replace an entry.
    async fn put(&self, namespace: &str, key: &str, entry: &CachedEntry) -> Result<(), Error>;

    /// Number of entries in a namespace (0 if it doesn't exist).
    async fn count(&self, namespace: &str) -> Result<usize, Error>;

    /// Entry counts per namespace, sorted by name.
    async fn namespace_stats(&self) -> Result<Vec<(String, usize)>, Error> {
        let mut stats = Vec::new();
        for name in self.namespaces().await? {
            let count = self.count(&name).await?;
            stats.push((name, count));
        }
        stats.sort();
        Ok(stats)
    }
}
