//! The fetch worker: drains the queue into the document store
//!
//! Each claimed task is fetched, its article extracted with the source's
//! strategy, and the result compared with the stored document. Only changed
//! text is written; an identical re-fetch just refreshes the timestamp.

use crate::config::Config;
use crate::crawler::fetcher::{fetch_page, FetchError};
use crate::crawler::pause;
use crate::extract::{Extracted, Extractor, ExtractorRegistry};
use crate::storage::{lock, DocumentRecord, QueueTask, SharedStorage, Storage, StorageResult};
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use scraper::Html;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What happened to one claimed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// First successful fetch, document created
    Saved,
    /// Text differed from the stored document, document replaced
    Updated,
    /// Text identical to the stored document, timestamp refreshed
    Unchanged,
    /// Extracted text not longer than the threshold, nothing written
    TooShort,
    /// The article page could not be fetched
    FetchFailed(FetchError),
    /// The fetch succeeded but the write did not
    StoreFailed,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved => write!(f, "saved"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::TooShort => write!(f, "too short"),
            Self::FetchFailed(e) => write!(f, "fetch failed ({})", e),
            Self::StoreFailed => write!(f, "store failed"),
        }
    }
}

/// Outcome counts for one or more drains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub saved: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub too_short: u64,
    pub fetch_failed: u64,
    pub store_failed: u64,
    /// Failed tasks put back in the queue for another attempt
    pub requeued: u64,
}

impl WorkerReport {
    /// Number of tasks that reached an outcome
    pub fn processed(&self) -> u64 {
        self.saved
            + self.updated
            + self.unchanged
            + self.too_short
            + self.fetch_failed
            + self.store_failed
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Saved => self.saved += 1,
            TaskOutcome::Updated => self.updated += 1,
            TaskOutcome::Unchanged => self.unchanged += 1,
            TaskOutcome::TooShort => self.too_short += 1,
            TaskOutcome::FetchFailed(_) => self.fetch_failed += 1,
            TaskOutcome::StoreFailed => self.store_failed += 1,
        }
    }

    fn merge(&mut self, other: &WorkerReport) {
        self.saved += other.saved;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.too_short += other.too_short;
        self.fetch_failed += other.fetch_failed;
        self.store_failed += other.store_failed;
        self.requeued += other.requeued;
    }
}

/// Drains the fetch queue one task at a time
///
/// Several workers may share one database: a task is claimed and removed in
/// one step, so each task reaches exactly one worker.
pub struct FetchWorker {
    config: Arc<Config>,
    storage: SharedStorage,
    client: Client,
    extractors: ExtractorRegistry,
}

impl FetchWorker {
    /// Creates a worker
    pub fn new(
        config: Arc<Config>,
        storage: SharedStorage,
        client: Client,
        extractors: ExtractorRegistry,
    ) -> Self {
        Self {
            config,
            storage,
            client,
            extractors,
        }
    }

    /// Processes queued tasks until the queue is empty or shutdown is signalled
    ///
    /// # Errors
    ///
    /// Per-task failures are reported in the [`WorkerReport`], not returned.
    /// Only two things end a drain with an error: the queue itself cannot be
    /// read, or a task belongs to a source without an extraction strategy
    /// (that task is put back first).
    pub async fn drain(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<WorkerReport, HarvestError> {
        let mut report = WorkerReport::default();

        loop {
            if *shutdown.borrow() {
                tracing::info!("Worker stopping on shutdown");
                break;
            }

            let claimed = {
                let mut storage = lock(&self.storage)?;
                storage.claim_task()?
            };
            let Some(task) = claimed else {
                tracing::debug!("Queue is empty");
                break;
            };

            let Some(extractor) = self.extractors.get(&task.source) else {
                self.put_back(&task);
                return Err(ConfigError::MissingExtractor(task.source.clone()).into());
            };

            if pause(self.politeness_delay(), shutdown).await {
                self.put_back(&task);
                tracing::info!("Worker stopping on shutdown, {} returned to the queue", task.url);
                break;
            }

            let outcome = self.process(&task, extractor.as_ref()).await;
            if self.should_retry(&task, &outcome) && self.requeue(&task) {
                report.requeued += 1;
            }

            tracing::info!("[{}] {}: {}", task.source, task.url, outcome);
            report.record(&outcome);
        }

        tracing::info!(
            "Worker drained {} tasks: {} saved, {} updated, {} unchanged, {} too short, {} fetch failed, {} store failed, {} requeued",
            report.processed(),
            report.saved,
            report.updated,
            report.unchanged,
            report.too_short,
            report.fetch_failed,
            report.store_failed,
            report.requeued
        );

        Ok(report)
    }

    /// Drains the queue, then again every `idle`, until shutdown
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        idle: Duration,
    ) -> Result<WorkerReport, HarvestError> {
        let mut total = WorkerReport::default();

        loop {
            let report = self.drain(&mut shutdown).await?;
            total.merge(&report);

            if pause(idle, &mut shutdown).await {
                break;
            }
        }

        Ok(total)
    }

    /// Fetches, extracts and writes one task
    async fn process(&self, task: &QueueTask, extractor: &dyn Extractor) -> TaskOutcome {
        let page = match fetch_page(&self.client, &task.url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("[{}] failed to fetch {}: {}", task.source, task.url, e);
                return TaskOutcome::FetchFailed(e);
            }
        };
        if page.url != task.url {
            // stored under the queued key, not the redirect target
            tracing::debug!("[{}] {} redirected to {}", task.source, task.url, page.url);
        }

        let extracted = {
            let document = Html::parse_document(&page.body);
            extractor.extract(&document)
        };

        let length = extracted.text.chars().count();
        if length <= self.config.crawler.min_text_length {
            tracing::debug!("[{}] {} has only {} characters of text", task.source, task.url, length);
            return TaskOutcome::TooShort;
        }

        match self.write(task, page.body, extracted, Utc::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[{}] failed to store {}: {}", task.source, task.url, e);
                TaskOutcome::StoreFailed
            }
        }
    }

    /// Change-detecting write
    fn write(
        &self,
        task: &QueueTask,
        raw_html: String,
        extracted: Extracted,
        now: DateTime<Utc>,
    ) -> StorageResult<TaskOutcome> {
        let mut storage = lock(&self.storage)?;
        let existing = storage.get_document(&task.url)?;

        if let Some(existing) = &existing {
            if existing.clean_text == extracted.text {
                storage.touch_document(&task.url, now)?;
                return Ok(TaskOutcome::Unchanged);
            }
        }

        storage.replace_document(&DocumentRecord {
            url: task.url.clone(),
            source: task.source.clone(),
            title: extracted.title,
            raw_html: Some(raw_html),
            clean_text: extracted.text,
            fetched_at: now,
        })?;

        Ok(if existing.is_some() {
            TaskOutcome::Updated
        } else {
            TaskOutcome::Saved
        })
    }

    fn should_retry(&self, task: &QueueTask, outcome: &TaskOutcome) -> bool {
        let retryable = match outcome {
            TaskOutcome::FetchFailed(e) => e.is_transient(),
            TaskOutcome::StoreFailed => true,
            _ => false,
        };
        retryable && task.attempts < self.config.crawler.fetch_retries
    }

    /// Puts a failed task at the back of the queue with one more attempt spent
    fn requeue(&self, task: &QueueTask) -> bool {
        let retry = QueueTask {
            enqueued_at: Utc::now(),
            attempts: task.attempts + 1,
            ..task.clone()
        };

        match lock(&self.storage).and_then(|mut storage| storage.upsert_task(&retry)) {
            Ok(()) => {
                tracing::debug!("Requeued {} (attempt {})", task.url, retry.attempts);
                true
            }
            Err(e) => {
                tracing::error!("Failed to requeue {}: {}", task.url, e);
                false
            }
        }
    }

    /// Returns an unprocessed task to the queue unchanged
    fn put_back(&self, task: &QueueTask) {
        if let Err(e) = lock(&self.storage).and_then(|mut storage| storage.upsert_task(task)) {
            tracing::error!("Failed to return {} to the queue: {}", task.url, e);
        }
    }

    fn politeness_delay(&self) -> Duration {
        let crawler = &self.config.crawler;
        let millis = if crawler.delay_min >= crawler.delay_max {
            crawler.delay_min
        } else {
            rand::rng().random_range(crawler.delay_min..=crawler.delay_max)
        };
        Duration::from_millis(millis)
    }
}
