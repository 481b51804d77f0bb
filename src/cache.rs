//! SQLite cache for fetched spreadsheet exports.
//!
//! Remote question sheets are re-downloaded at most once per TTL window.
//! Bodies are stored verbatim, keyed by the resolved source URL.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// How long a fetched sheet stays fresh (seconds)
pub const DEFAULT_TTL_SECS: u64 = 300;

pub struct SheetCache {
    conn: Connection,
}

impl SheetCache {
    /// Open (or create) the cache database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open sheet cache at {:?}", path))?;
        Self::init(conn)
    }

    /// Cache that lives only for the current process
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory sheet cache")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sheets (
                source      TEXT PRIMARY KEY,
                body        TEXT NOT NULL,
                fetched_at  INTEGER NOT NULL
            );",
        )
        .context("Failed to create sheets table")?;
        Ok(Self { conn })
    }

    /// Cached body for `source` if it was fetched less than `ttl` seconds before `now`.
    pub fn get_fresh(&self, source: &str, ttl: u64, now: u64) -> Result<Option<String>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT body, fetched_at FROM sheets WHERE source = ?1",
                params![source],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read sheet cache")?;

        Ok(row.and_then(|(body, fetched_at)| {
            let age = now.saturating_sub(fetched_at.max(0) as u64);
            (age < ttl).then_some(body)
        }))
    }

    /// Insert or replace the body for `source`.
    pub fn put(&self, source: &str, body: &str, now: u64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sheets (source, body, fetched_at) VALUES (?1, ?2, ?3)",
                params![source, body, now as i64],
            )
            .context("Failed to write sheet cache")?;
        Ok(())
    }

    /// Drop entries fetched before `cutoff`. Returns the number removed.
    pub fn purge_older_than(&self, cutoff: u64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM sheets WHERE fetched_at < ?1", params![cutoff as i64])
            .context("Failed to purge sheet cache")?;
        Ok(removed)
    }
}

pub fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
