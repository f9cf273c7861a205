//! Storage module for persisting harvested articles
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The document store, keyed by normalized URL
//! - The pending-task queue shared by discovery and fetching

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{DocumentVisitor, Storage, StorageError, StorageResult};

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by the frontier and the fetch worker
///
/// Guards are taken between awaits only, never held across one.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Opens a database wrapped for sharing between tasks
pub fn open_shared(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(open_storage(path)?)))
}

/// Locks a shared storage handle
///
/// A poisoned lock means another task panicked mid-operation; it is reported
/// as a storage error rather than propagated as a panic.
pub fn lock<S: ?Sized>(storage: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// A harvested article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Normalized URL, the document's identity
    pub url: String,
    pub source: String,
    pub title: String,
    pub raw_html: Option<String>,
    pub clean_text: String,
    /// Time of the last successful fetch
    pub fetched_at: DateTime<Utc>,
}

/// An article waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTask {
    /// Normalized URL, the task's identity
    pub url: String,
    pub source: String,
    pub enqueued_at: DateTime<Utc>,
    /// Failed fetch/store attempts already spent on this task
    pub attempts: u32,
}

impl QueueTask {
    /// Creates a fresh task with no attempts spent
    pub fn new(url: impl Into<String>, source: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            enqueued_at,
            attempts: 0,
        }
    }
}

/// Formats a timestamp for storage
///
/// Fixed-width RFC 3339 in UTC, so that text order is time order.
pub(crate) fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub(crate) fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}
