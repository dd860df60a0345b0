//! SQLite-backed `PersistentStore`.

use super::{ChangeKind, PersistentStore, StorageChange, StoreResult};
use crate::db::{open_db, open_db_in_memory, DbError};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Key-value store over the `kv_entries` table.
pub struct SqliteStore {
    conn: Connection,
    changes: broadcast::Sender<StorageChange>,
}

impl SqliteStore {
    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_store_ready(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { conn, changes })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    fn notify(&self, key: &str, kind: ChangeKind) {
        let listeners = self.changes.send(StorageChange {
            key: key.to_string(),
            kind,
        });
        debug!(
            "event=store_change module=store key={key} kind={kind:?} listeners={}",
            listeners.unwrap_or(0)
        );
    }
}

impl PersistentStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        self.notify(key, ChangeKind::Set);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        if changed > 0 {
            self.notify(key, ChangeKind::Removed);
        }
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

fn ensure_store_ready(conn: &Connection) -> StoreResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'kv_entries'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(DbError::MissingRequiredTable("kv_entries").into());
    }
    Ok(())
}
