//! Plain-text corpus export
//!
//! Writes the clean text of every stored article to its own numbered UTF-8
//! file, the input format of downstream text processing.

use crate::storage::{Storage, StorageResult};
use std::fs;
use std::path::Path;

/// How often export progress is logged
const PROGRESS_EVERY: u64 = 100;

/// Exports every article with non-empty text to `<dir>/<n>.txt`
///
/// Files are numbered from 0 in URL order; articles with empty text are
/// skipped without using up a number. The directory is created if needed and
/// existing files with the same names are overwritten.
///
/// # Arguments
///
/// * `storage` - The storage backend holding the articles
/// * `dir` - Output directory
///
/// # Returns
///
/// * `Ok(u64)` - Number of files written
/// * `Err(StorageError)` - A query or a file write failed
pub fn export_corpus(storage: &dyn Storage, dir: &Path) -> StorageResult<u64> {
    fs::create_dir_all(dir)?;

    let mut written = 0u64;
    storage.visit_documents(&mut |document| {
        if document.clean_text.is_empty() {
            return Ok(());
        }

        fs::write(dir.join(format!("{}.txt", written)), document.clean_text.as_bytes())?;
        written += 1;

        if written % PROGRESS_EVERY == 0 {
            tracing::info!("Exported {} articles", written);
        }
        Ok(())
    })?;

    tracing::info!("Exported {} articles to {}", written, dir.display());
    Ok(written)
}
