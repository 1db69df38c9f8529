//! In-memory `CacheStorage` for tests and ephemeral runs.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::entry::CachedEntry;
use super::storage::CacheStorage;
use crate::Error;

/// Namespaces held in a HashMap behind a tokio RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryStore {
    async fn open(&self, namespace: &str) -> Result<(), Error> {
        self.namespaces.write().await.entry(namespace.to_string()).or_default();
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = self.namespaces.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
        Ok(self.namespaces.write().await.remove(namespace).is_some())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, entry: &CachedEntry) -> Result<(), Error> {
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn count(&self, namespace: &str) -> Result<usize, Error> {
        Ok(self.namespaces.read().await.get(namespace).map_or(0, HashMap::len))
    }
}
