//! Admission of discovered article URLs into the fetch queue

use crate::storage::{lock, QueueTask, SharedStorage, Storage, StorageError, StorageResult};
use crate::url::Normalizer;
use crate::UrlError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Decision taken for one discovered URL
#[derive(Debug)]
pub enum Admission {
    /// The URL is now pending in the queue
    Queued,
    /// The article was fetched, or queued, within the recrawl interval
    SkippedRecent,
    /// The URL could not be admitted; discovery carries on with the next one
    SkippedError(AdmitError),
}

/// Why a URL could not be admitted
#[derive(Debug, Error)]
pub enum AdmitError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("store failure: {0}")]
    Store(#[from] StorageError),
}

/// Decides whether a discovered URL should be (re-)queued
///
/// The gate is the only writer of new queue rows, and the only place raw
/// discovered URLs are normalized, so a URL admitted twice through different
/// spellings still lands on one queue row.
#[derive(Clone)]
pub struct AdmissionGate {
    storage: SharedStorage,
    normalizer: Normalizer,
    recrawl_interval: Duration,
}

impl AdmissionGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared document store and queue
    /// * `normalizer` - The identity function shared with the fetch worker
    /// * `recrawl_interval` - Minimum age of a fetch or admission before a URL is eligible again
    pub fn new(storage: SharedStorage, normalizer: Normalizer, recrawl_interval: Duration) -> Self {
        Self {
            storage,
            normalizer,
            recrawl_interval,
        }
    }

    /// Admits a URL at the current time
    pub fn admit(&self, raw_url: &str, source: &str) -> Admission {
        self.admit_at(raw_url, source, Utc::now())
    }

    /// Admits a URL as if the current time were `now`
    ///
    /// 1. Normalize the URL
    /// 2. Skip if the stored document was fetched less than the interval ago
    /// 3. Skip if the URL was queued less than the interval ago
    /// 4. Otherwise write the queue row (inserting or refreshing it)
    ///
    /// Never fails: store errors come back as [`Admission::SkippedError`].
    pub fn admit_at(&self, raw_url: &str, source: &str, now: DateTime<Utc>) -> Admission {
        let url = match self.normalizer.normalize(raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Not admitting {}: {}", raw_url, e);
                return Admission::SkippedError(e.into());
            }
        };

        match self.try_admit(&url, source, now) {
            Ok(admission) => {
                tracing::trace!("{} -> {:?}", url, admission);
                admission
            }
            Err(e) => {
                tracing::warn!("Failed to admit {}: {}", url, e);
                Admission::SkippedError(e.into())
            }
        }
    }

    fn try_admit(&self, url: &str, source: &str, now: DateTime<Utc>) -> StorageResult<Admission> {
        let mut storage = lock(&self.storage)?;

        if let Some(document) = storage.get_document(url)? {
            if self.is_recent(document.fetched_at, now) {
                return Ok(Admission::SkippedRecent);
            }
        }

        if let Some(task) = storage.get_task(url)? {
            if self.is_recent(task.enqueued_at, now) {
                return Ok(Admission::SkippedRecent);
            }
        }

        storage.upsert_task(&QueueTask::new(url, source, now))?;
        Ok(Admission::Queued)
    }

    /// Timestamps later than `now` count as recent
    fn is_recent(&self, then: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - then).to_std() {
            Ok(age) => age < self.recrawl_interval,
            Err(_) => true,
        }
    }
}
