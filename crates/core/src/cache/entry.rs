//! Stored response snapshots and their freshness stamp.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Header carrying the time an entry was written to the store.
///
/// Only this engine reads it; it is not part of any wire protocol.
pub const STORED_AT_HEADER: &str = "x-shellcache-stored-at";

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl CachedEntry {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Return a copy stamped with the store time.
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.headers.insert(STORED_AT_HEADER.to_string(), at.to_rfc3339());
        self
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get(STORED_AT_HEADER)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Age relative to `now`, or `None` when the stamp is missing or unreadable.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.stored_at().map(|stored| now - stored)
    }

    /// An entry is expired once its age reaches the TTL.
    ///
    /// Without a TTL nothing expires. An entry without a readable stamp is
    /// treated as expired whenever a TTL applies.
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        let Some(age) = self.age(now) else {
            return true;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age >= ttl,
            Err(_) => false,
        }
    }
}
