use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::models::PublishRecord;
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode publish response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to create ledger directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys of records already submitted to the Gancio instance.
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRow {
    pub key: String,
    pub title: String,
    pub start_epoch: i64,
    pub source_url: String,
    pub published_at_utc: String,
}

impl Store {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&utils::ledger_path())
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path)?;
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS published(
                key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                start_epoch INTEGER NOT NULL,
                source_url TEXT NOT NULL,
                published_at_utc TEXT NOT NULL,
                response_json TEXT
            );",
        )
    }

    pub fn is_published(&self, key: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM published WHERE key = ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn mark_published(
        &self,
        record: &PublishRecord,
        response: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let response_json = serde_json::to_string(response)?;
        self.conn.execute(
            "INSERT INTO published (key, title, start_epoch, source_url, published_at_utc, response_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
               published_at_utc = excluded.published_at_utc,
               response_json = excluded.response_json",
            params![
                record.key(),
                record.title,
                record.start_datetime,
                record.source_url(),
                at.to_rfc3339(),
                response_json
            ],
        )?;
        Ok(())
    }

    pub fn list_published(&self) -> Result<Vec<PublishedRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, title, start_epoch, source_url, published_at_utc
             FROM published ORDER BY start_epoch",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PublishedRow {
                key: row.get(0)?,
                title: row.get(1)?,
                start_epoch: row.get(2)?,
                source_url: row.get(3)?,
                published_at_utc: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
