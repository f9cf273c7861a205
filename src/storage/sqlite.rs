//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DocumentVisitor, Storage, StorageResult};
use crate::storage::{format_timestamp, parse_timestamp, DocumentRecord, QueueTask};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// How long a connection waits for another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// Several instances (in one process or several) may open the same file;
    /// WAL mode and the busy timeout let their writes queue up instead of
    /// failing with `SQLITE_BUSY`.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count_grouped(&self, sql: &str) -> StorageResult<BTreeMap<String, u64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(counts)
    }
}

/// Column values of a `documents` row before timestamp parsing
type DocumentRow = (String, String, String, Option<String>, String, String);

fn document_from_row(row: DocumentRow) -> StorageResult<DocumentRecord> {
    let (url, source, title, raw_html, clean_text, fetched_at) = row;
    Ok(DocumentRecord {
        url,
        source,
        title,
        raw_html,
        clean_text,
        fetched_at: parse_timestamp(&fetched_at)?,
    })
}

fn task_from_row(row: (String, String, String, u32)) -> StorageResult<QueueTask> {
    let (url, source, enqueued_at, attempts) = row;
    Ok(QueueTask {
        url,
        source,
        enqueued_at: parse_timestamp(&enqueued_at)?,
        attempts,
    })
}

impl Storage for SqliteStorage {
    // ===== Documents =====

    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>> {
        let row: Option<DocumentRow> = self
            .conn
            .query_row(
                "SELECT url, source, title, raw_html, clean_text, fetched_at
                 FROM documents WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(document_from_row).transpose()
    }

    fn replace_document(&mut self, document: &DocumentRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO documents (url, source, title, raw_html, clean_text, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET
                source = excluded.source,
                title = excluded.title,
                raw_html = excluded.raw_html,
                clean_text = excluded.clean_text,
                fetched_at = excluded.fetched_at",
            params![
                document.url,
                document.source,
                document.title,
                document.raw_html,
                document.clean_text,
                format_timestamp(document.fetched_at)
            ],
        )?;
        Ok(())
    }

    fn touch_document(&mut self, url: &str, fetched_at: DateTime<Utc>) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE documents SET fetched_at = ?1 WHERE url = ?2",
            params![format_timestamp(fetched_at), url],
        )?;
        Ok(updated > 0)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_documents_by_source(&self) -> StorageResult<BTreeMap<String, u64>> {
        self.count_grouped("SELECT source, COUNT(*) FROM documents GROUP BY source")
    }

    fn document_fetch_range(&self) -> StorageResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(fetched_at), MAX(fetched_at) FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match (oldest, newest) {
            (Some(oldest), Some(newest)) => Ok(Some((
                parse_timestamp(&oldest)?,
                parse_timestamp(&newest)?,
            ))),
            _ => Ok(None),
        }
    }

    fn visit_documents(&self, visitor: &mut DocumentVisitor<'_>) -> StorageResult<u64> {
        let mut stmt = self.conn.prepare(
            "SELECT url, source, title, raw_html, clean_text, fetched_at
             FROM documents ORDER BY url",
        )?;

        let rows = stmt.query_map([], |row| -> rusqlite::Result<DocumentRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;

        let mut visited = 0;
        for row in rows {
            visitor(document_from_row(row?)?)?;
            visited += 1;
        }

        Ok(visited)
    }

    // ===== Queue =====

    fn upsert_task(&mut self, task: &QueueTask) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO queue (url, source, enqueued_at, attempts) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                source = excluded.source,
                enqueued_at = excluded.enqueued_at,
                attempts = excluded.attempts",
            params![
                task.url,
                task.source,
                format_timestamp(task.enqueued_at),
                task.attempts
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, url: &str) -> StorageResult<Option<QueueTask>> {
        let row: Option<(String, String, String, u32)> = self
            .conn
            .query_row(
                "SELECT url, source, enqueued_at, attempts FROM queue WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(task_from_row).transpose()
    }

    fn claim_task(&mut self) -> StorageResult<Option<QueueTask>> {
        // IMMEDIATE takes the write lock up front, so a second claimer blocks
        // on the busy timeout instead of reading the same row
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, String, String, u32)> = tx
            .query_row(
                "SELECT url, source, enqueued_at, attempts FROM queue
                 ORDER BY enqueued_at, rowid LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        if let Some((url, ..)) = &row {
            tx.execute("DELETE FROM queue WHERE url = ?1", params![url])?;
        }

        tx.commit()?;

        row.map(task_from_row).transpose()
    }

    fn count_tasks(&self) -> StorageResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_tasks_by_source(&self) -> StorageResult<BTreeMap<String, u64>> {
        self.count_grouped("SELECT source, COUNT(*) FROM queue GROUP BY source")
    }
}
