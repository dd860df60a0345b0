//! Durable key-value storage with change notification.
//!
//! # Responsibility
//! - Hold the note collection and auxiliary settings as JSON text values.
//! - Publish a `StorageChange` after every successful write.
//!
//! # Invariants
//! - The store has no domain logic; callers own read-modify-write sequences.
//! - Change notifications are best-effort and never fail a write.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;

mod sqlite_store;

pub use sqlite_store::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of write observed on one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Removed,
}

/// Notification emitted after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub kind: ChangeKind,
}

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Backend-specific failure not covered by SQLite errors.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Backend(message) => write!(f, "storage backend failure: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Backend(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key-value storage contract used by the note repository.
pub trait PersistentStore: Send {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;
    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange>;
}
