//! Responses produced by the engine.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shellcache_core::CachedEntry;
use shellcache_core::cache::STORED_AT_HEADER;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The fixed offline placeholder document.
    Offline,
}

/// A response handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn network(status: u16, headers: BTreeMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), source: ResponseSource::Network }
    }

    /// Serve a stored entry. The freshness stamp stays internal to the store.
    pub fn from_entry(entry: CachedEntry) -> Self {
        let mut headers = entry.headers;
        headers.remove(STORED_AT_HEADER);
        Self { status: entry.status, headers, body: entry.body, source: ResponseSource::Cache }
    }

    /// Fixed HTML placeholder served to navigations with nothing to fall back on.
    pub fn offline(status: u16, body: impl Into<Bytes>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html; charset=utf-8".to_string());
        headers.insert("cache-control".to_string(), "no-store".to_string());
        Self { status, headers, body: body.into(), source: ResponseSource::Offline }
    }

    /// Snapshot for storage. `Bytes` clones share the buffer.
    pub fn to_entry(&self) -> CachedEntry {
        CachedEntry::new(self.status, self.headers.clone(), self.body.clone())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
