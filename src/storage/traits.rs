//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{DocumentRecord, QueueTask};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned by a panicked task")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Callback handed each document by [`Storage::visit_documents`]
pub type DocumentVisitor<'a> = dyn FnMut(DocumentRecord) -> StorageResult<()> + 'a;

/// Trait for storage backend implementations
///
/// Both collections are keyed by the normalized article URL. Every write is a
/// single statement (or a single transaction), so a crash never leaves a
/// half-written row behind.
pub trait Storage {
    // ===== Documents =====

    /// Gets a document by normalized URL
    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>>;

    /// Inserts a document or replaces every field of the existing one
    fn replace_document(&mut self, document: &DocumentRecord) -> StorageResult<()>;

    /// Refreshes the fetch timestamp of a document, leaving its content alone
    ///
    /// # Returns
    ///
    /// `true` if a document with this URL existed
    fn touch_document(&mut self, url: &str, fetched_at: DateTime<Utc>) -> StorageResult<bool>;

    /// Gets total document count
    fn count_documents(&self) -> StorageResult<u64>;

    /// Counts documents per source
    fn count_documents_by_source(&self) -> StorageResult<BTreeMap<String, u64>>;

    /// Gets the oldest and newest fetch timestamps, if any document exists
    fn document_fetch_range(&self) -> StorageResult<Option<(DateTime<Utc>, DateTime<Utc>)>>;

    /// Streams every document, in URL order, to `visitor`
    ///
    /// Stops at the first error the visitor returns.
    ///
    /// # Returns
    ///
    /// The number of documents visited
    fn visit_documents(&self, visitor: &mut DocumentVisitor<'_>) -> StorageResult<u64>;

    // ===== Queue =====

    /// Inserts a task or overwrites the metadata of the queued one
    fn upsert_task(&mut self, task: &QueueTask) -> StorageResult<()>;

    /// Gets a queued task by normalized URL
    fn get_task(&self, url: &str) -> StorageResult<Option<QueueTask>>;

    /// Removes and returns the oldest queued task
    ///
    /// Retrieval and removal happen in one transaction: when several workers
    /// share the database each task is handed to exactly one of them.
    fn claim_task(&mut self) -> StorageResult<Option<QueueTask>>;

    /// Gets the number of pending tasks
    fn count_tasks(&self) -> StorageResult<u64>;

    /// Counts pending tasks per source
    fn count_tasks_by_source(&self) -> StorageResult<BTreeMap<String, u64>>;
}
