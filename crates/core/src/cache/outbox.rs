//! Outbox of submissions made while offline.
//!
//! Entries are appended on a failed submit and deleted once a replay is
//! confirmed. They are never updated in place.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A submission waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutboxEntry {
    pub id: i64,
    /// Sync tag that drains this entry (e.g. `contact-sync`).
    pub tag: String,
    /// Absolute URL the payload is delivered to.
    pub endpoint: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Fields supplied when queueing; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub tag: String,
    pub endpoint: String,
    pub content_type: String,
    pub payload: Vec<u8>,
}

impl CacheDb {
    /// Queue a submission. Returns the assigned id.
    pub async fn enqueue_outbox(&self, entry: NewOutboxEntry) -> Result<i64, Error> {
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO outbox (tag, endpoint, content_type, payload, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![entry.tag, entry.endpoint, entry.content_type, entry.payload, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// Pending entries for `tag` (or every tag when `None`), oldest first.
    pub async fn list_outbox(&self, tag: Option<&str>) -> Result<Vec<OutboxEntry>, Error> {
        let tag = tag.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<Vec<OutboxEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, tag, endpoint, content_type, payload, created_at
                     FROM outbox WHERE ?1 IS NULL OR tag = ?1 ORDER BY id",
                )?;
                let entries = stmt
                    .query_map(params![tag], |row| {
                        Ok(OutboxEntry {
                            id: row.get(0)?,
                            tag: row.get(1)?,
                            endpoint: row.get(2)?,
                            content_type: row.get(3)?,
                            payload: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a delivered entry. Returns false if it was already gone.
    pub async fn delete_outbox(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of pending entries across all tags.
    pub async fn outbox_len(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}
