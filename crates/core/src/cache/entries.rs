//! `CacheStorage` over SQLite.
//!
//! Namespaces are rows in `namespaces`; entries cascade with them, so
//! deleting a namespace reclaims everything stored under it in one statement.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::entry::CachedEntry;
use super::storage::CacheStorage;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

#[async_trait::async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, namespace: &str) -> Result<(), Error> {
        let namespace = namespace.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn namespaces(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![namespace])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
                );

                match result {
                    Ok((status, headers_json, body)) => {
                        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
                        Ok(Some(CachedEntry::new(status, headers, body)))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, namespace: &str, key: &str, entry: &CachedEntry) -> Result<(), Error> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        let status = entry.status;
        let headers_json = serde_json::to_string(&entry.headers)?;
        let body = entry.body.to_vec();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![&namespace, &now],
                )?;
                tx.execute(
                    "INSERT INTO entries (namespace, key, status, headers_json, body, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(namespace, key) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![&namespace, &key, status, &headers_json, &body, &now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn count(&self, namespace: &str) -> Result<usize, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![namespace], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// One grouped query instead of a count per namespace.
    async fn namespace_stats(&self) -> Result<Vec<(String, usize)>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<(String, usize)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT n.name, COUNT(e.key) FROM namespaces n
                     LEFT JOIN entries e ON e.namespace = n.name
                     GROUP BY n.name ORDER BY n.name",
                )?;
                let stats = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(body: &str) -> CachedEntry {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        CachedEntry::new(200, headers, body.to_string())
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("<html></html>");

        db.put("v1", "key-a", &entry).await.unwrap();

        let retrieved = db.get("v1", "key-a").await.unwrap().unwrap();
        assert_eq!(retrieved, entry);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("v1", "key-a", &make_entry("old")).await.unwrap();
        db.put("v1", "key-a", &make_entry("new")).await.unwrap();

        let retrieved = db.get("v1", "key-a").await.unwrap().unwrap();
        assert_eq!(retrieved.body.as_ref(), b"new");
        assert_eq!(db.count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_partitions() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("v0", "key-a", &make_entry("zero")).await.unwrap();
        db.put("v1", "key-a", &make_entry("one")).await.unwrap();

        assert_eq!(db.get("v0", "key-a").await.unwrap().unwrap().body.as_ref(), b"zero");
        assert_eq!(db.get("v1", "key-a").await.unwrap().unwrap().body.as_ref(), b"one");
        assert_eq!(db.namespaces().await.unwrap(), vec!["v0".to_string(), "v1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_namespace_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("v0", "key-a", &make_entry("zero")).await.unwrap();

        assert!(db.delete_namespace("v0").await.unwrap());
        assert!(!db.delete_namespace("v0").await.unwrap());
        assert_eq!(db.count("v0").await.unwrap(), 0);
        assert!(db.get("v0", "key-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespace_stats() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("empty").await.unwrap();
        db.put("v1", "a", &make_entry("a")).await.unwrap();
        db.put("v1", "b", &make_entry("b")).await.unwrap();

        let stats = db.namespace_stats().await.unwrap();
        assert_eq!(stats, vec![("empty".to_string(), 0), ("v1".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.clone();
        let second = db.clone();

        let (a, b) = tokio::join!(
            async move { first.put("v1", "key-a", &make_entry("first")).await },
            async move { second.put("v1", "key-a", &make_entry("second")).await },
        );
        a.unwrap();
        b.unwrap();

        let body = db.get("v1", "key-a").await.unwrap().unwrap().body;
        assert!(body.as_ref() == b"first" || body.as_ref() == b"second");
        assert_eq!(db.count("v1").await.unwrap(), 1);

        db.put("v1", "key-a", &make_entry("third")).await.unwrap();
        assert_eq!(db.get("v1", "key-a").await.unwrap().unwrap().body.as_ref(), b"third");
    }
}
