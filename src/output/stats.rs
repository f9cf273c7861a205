//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Total number of stored articles
    pub total_documents: u64,

    /// Stored articles per source
    pub documents_by_source: BTreeMap<String, u64>,

    /// Articles waiting in the queue
    pub pending_tasks: u64,

    /// Queued articles per source
    pub tasks_by_source: BTreeMap<String, u64>,

    /// Fetch time of the least recently fetched article
    pub oldest_fetch: Option<DateTime<Utc>>,

    /// Fetch time of the most recently fetched article
    pub newest_fetch: Option<DateTime<Utc>>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HarvestStatistics> {
    let range = storage.document_fetch_range()?;

    Ok(HarvestStatistics {
        total_documents: storage.count_documents()?,
        documents_by_source: storage.count_documents_by_source()?,
        pending_tasks: storage.count_tasks()?,
        tasks_by_source: storage.count_tasks_by_source()?,
        oldest_fetch: range.map(|(oldest, _)| oldest),
        newest_fetch: range.map(|(_, newest)| newest),
    })
}

/// Renders statistics as the text `print_statistics` writes
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "=== Harvest Statistics ===\n");

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Articles stored: {}", stats.total_documents);
    let _ = writeln!(out, "  Articles pending: {}", stats.pending_tasks);
    let _ = writeln!(out);

    let sources: BTreeSet<&String> = stats
        .documents_by_source
        .keys()
        .chain(stats.tasks_by_source.keys())
        .collect();

    if !sources.is_empty() {
        let _ = writeln!(out, "By Source:");
        for source in sources {
            let stored = stats.documents_by_source.get(source).copied().unwrap_or(0);
            let pending = stats.tasks_by_source.get(source).copied().unwrap_or(0);
            let share = if stats.total_documents > 0 {
                (stored as f64 / stats.total_documents as f64) * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "  {}: {} stored ({:.1}%), {} pending",
                source, stored, share, pending
            );
        }
        let _ = writeln!(out);
    }

    match (stats.oldest_fetch, stats.newest_fetch) {
        (Some(oldest), Some(newest)) => {
            let _ = writeln!(out, "Oldest fetch: {}", oldest.to_rfc3339());
            let _ = writeln!(out, "Newest fetch: {}", newest.to_rfc3339());
        }
        _ => {
            let _ = writeln!(out, "No articles fetched yet");
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}
