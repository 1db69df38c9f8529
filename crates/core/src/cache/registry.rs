//! Version registry: namespace naming and reclamation of stale versions.

use std::sync::Arc;

use super::storage::CacheStorage;
use crate::Error;

/// Derives the current namespace from a version tag and deletes all others.
///
/// Reclamation only ever targets names different from the current one, so a
/// concurrent write into the current namespace can't lose data to it.
#[derive(Clone)]
pub struct VersionRegistry {
    storage: Arc<dyn CacheStorage>,
    prefix: Option<String>,
}

impl VersionRegistry {
    pub fn new(storage: Arc<dyn CacheStorage>, prefix: Option<String>) -> Self {
        let prefix = prefix.filter(|p| !p.is_empty());
        Self { storage, prefix }
    }

    /// Namespace name for a version tag: `{prefix}-{tag}`, or the bare tag.
    pub fn current_namespace(&self, tag: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}-{tag}"),
            None => tag.to_string(),
        }
    }

    /// Delete every namespace other than the current one.
    ///
    /// Returns the number of namespaces deleted; a second call with the
    /// same tag deletes nothing.
    pub async fn reclaim_stale(&self, tag: &str) -> Result<usize, Error> {
        let current = self.current_namespace(tag);
        let mut deleted = 0;

        for name in self.storage.namespaces().await? {
            if name == current {
                continue;
            }
            if self.storage.delete_namespace(&name).await? {
                tracing::info!(namespace = %name, current = %current, "reclaimed stale namespace");
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Entry counts for every namespace in the store.
    pub async fn namespace_stats(&self) -> Result<Vec<(String, usize)>, Error> {
        self.storage.namespace_stats().await
    }
}
