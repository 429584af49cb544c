//! Named cache stores.
//!
//! A store maps a request identity (method + URL) to a response snapshot.
//! Stores are created on first open and removed as a unit; there is no
//! per-entry expiry.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of the write; set by the store.
    #[serde(default)]
    pub stored_at: String,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { status, headers, body, stored_at: String::new() }
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to one named store.
///
/// Cheap to clone; every clone talks to the same database.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open (creating if needed) the store called `name`.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_store(conn, &owned)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore { db: self.clone(), name: name.to_string() })
    }

    /// Names of every existing store, oldest first.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY id")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a store called `name` exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        Ok(self.store_id(name).await?.is_some())
    }

    /// Row id of the store, which stays fixed for the lifetime of the store.
    pub async fn store_id(&self, name: &str) -> Result<Option<i64>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<i64>, Error> {
                let id = conn
                    .query_row("SELECT id FROM stores WHERE name = ?1", params![name], |row| row.get(0))
                    .optional()?;
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if no such store existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM store_entries WHERE store_name = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the response stored for `method` + `url`.
    pub async fn get(&self, method: &str, url: &str) -> Result<Option<CachedResponse>, Error> {
        let key = compute_request_key(method, url);
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let row = conn
                    .query_row(
                        "SELECT status_code, headers_json, body, stored_at
                         FROM store_entries WHERE store_name = ?1 AND request_key = ?2",
                        params![name, key],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, Vec<u8>>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((status, headers_json, body, stored_at)) = row else {
                    return Ok(None);
                };
                let status = u16::try_from(status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
                let headers =
                    serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

                Ok(Some(CachedResponse { status, headers, body, stored_at }))
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response for `method` + `url`, replacing any previous entry.
    pub async fn put(&self, method: &str, url: &str, response: &CachedResponse) -> Result<(), Error> {
        self.put_all(vec![(method.to_string(), url.to_string(), response.clone())])
            .await
    }

    /// Store several responses in one transaction: either all land or none do.
    ///
    /// Re-putting an existing request replaces it in place, so repeating the
    /// same batch never grows the store.
    pub async fn put_all(&self, entries: Vec<(String, String, CachedResponse)>) -> Result<(), Error> {
        let name = self.name.clone();
        let stored_at = Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                // writing to a deleted store recreates it, like reopening it
                ensure_store(&tx, &name)?;
                for (method, url, response) in &entries {
                    let headers_json = serde_json::to_string(&response.headers)
                        .map_err(|e| Error::CorruptEntry(e.to_string()))?;
                    tx.execute(
                        "INSERT INTO store_entries (
                            store_name, request_key, method, url, status_code, headers_json, body, stored_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        ON CONFLICT(store_name, request_key) DO UPDATE SET
                            status_code = excluded.status_code,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![
                            name,
                            compute_request_key(method, url),
                            method.to_ascii_uppercase(),
                            url,
                            response.status as i64,
                            headers_json,
                            response.body,
                            stored_at,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns false if it was not present.
    pub async fn delete(&self, method: &str, url: &str) -> Result<bool, Error> {
        let key = compute_request_key(method, url);
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM store_entries WHERE store_name = ?1 AND request_key = ?2",
                    params![name, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn len(&self) -> Result<usize, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM store_entries WHERE store_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}

fn ensure_store(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> CachedResponse {
        CachedResponse::new(200, vec![("content-type".into(), "text/html".into())], body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("static-v1").await.unwrap();

        store.put("GET", "https://example.com/", &page("<h1>home</h1>")).await.unwrap();

        let hit = store.get("GET", "https://example.com/").await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, b"<h1>home</h1>");
        assert_eq!(hit.header("Content-Type"), Some("text/html"));
        assert!(!hit.stored_at.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("static-v1").await.unwrap();
        assert!(store.get("GET", "https://example.com/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let statics = db.open_store("static-v1").await.unwrap();
        let dynamic = db.open_store("dynamic-v1").await.unwrap();

        statics.put("GET", "https://example.com/", &page("static")).await.unwrap();

        assert!(dynamic.get("GET", "https://example.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("dynamic-v1").await.unwrap();

        store.put("GET", "https://example.com/p", &page("old")).await.unwrap();
        store.put("GET", "https://example.com/p", &page("new")).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let hit = store.get("GET", "https://example.com/p").await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
    }

    #[tokio::test]
    async fn test_open_store_keeps_identity() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("static-v1").await.unwrap();
        let first = db.store_id("static-v1").await.unwrap();
        db.open_store("static-v1").await.unwrap();
        let second = db.store_id("static-v1").await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(db.store_names().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_store_removes_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("image-v1").await.unwrap();
        store.put("GET", "https://example.com/a.png", &page("png")).await.unwrap();

        assert!(db.delete_store("image-v1").await.unwrap());
        assert!(!db.has_store("image-v1").await.unwrap());
        assert!(!db.delete_store("image-v1").await.unwrap());

        // reopening yields an empty store
        let reopened = db.open_store("image-v1").await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_after_delete_recreates_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("dynamic-v1").await.unwrap();
        db.delete_store("dynamic-v1").await.unwrap();

        store.put("GET", "https://example.com/", &page("again")).await.unwrap();

        assert!(db.has_store("dynamic-v1").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("dynamic-v1").await.unwrap();
        store.put("GET", "https://example.com/x", &page("x")).await.unwrap();

        assert!(store.delete("GET", "https://example.com/x").await.unwrap());
        assert!(!store.delete("GET", "https://example.com/x").await.unwrap());
    }
}
