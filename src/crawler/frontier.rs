//! Discovery: walks the paginated listings of every source
//!
//! One pass requests the next listing page of each source in turn, feeds the
//! article links it finds to the admission gate, and moves the source's cursor
//! on when the page yielded links. Pages that fail or come back empty are
//! retried on the next pass.

use crate::config::{Config, SourceConfig};
use crate::crawler::admission::{Admission, AdmissionGate};
use crate::crawler::fetcher::fetch_page;
use crate::crawler::pause;
use crate::state::CrawlState;
use crate::url::LinkMatcher;
use crate::{ConfigError, HarvestError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

/// Totals for one or more discovery passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Listing pages that yielded at least one article link
    pub listings_fetched: u64,
    /// Listing requests that failed or returned a non-200 status
    pub listings_failed: u64,
    /// Listing pages without any article link
    pub listings_empty: u64,
    pub queued: u64,
    pub recent: u64,
    pub errors: u64,
}

impl PassReport {
    fn merge(&mut self, other: &PassReport) {
        self.listings_fetched += other.listings_fetched;
        self.listings_failed += other.listings_failed;
        self.listings_empty += other.listings_empty;
        self.queued += other.queued;
        self.recent += other.recent;
        self.errors += other.errors;
    }
}

/// A source with its link rule compiled
struct ListingSource {
    config: SourceConfig,
    matcher: LinkMatcher,
    base_url: Url,
}

/// The discovery loop
pub struct Frontier {
    config: Arc<Config>,
    client: Client,
    gate: AdmissionGate,
    sources: Vec<ListingSource>,
    state: CrawlState,
}

impl Frontier {
    /// Creates a frontier over every configured source
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a link selector or base URL does not parse
    pub fn new(
        config: Arc<Config>,
        client: Client,
        gate: AdmissionGate,
        state: CrawlState,
    ) -> Result<Self, ConfigError> {
        let sources = config
            .sources
            .iter()
            .map(|source| {
                let base_url = Url::parse(&source.base_url).map_err(|e| {
                    ConfigError::InvalidUrl(format!("'{}': {}", source.base_url, e))
                })?;
                Ok(ListingSource {
                    config: source.clone(),
                    matcher: LinkMatcher::compile(&source.links)?,
                    base_url,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            config,
            client,
            gate,
            sources,
            state,
        })
    }

    /// The in-memory cursor
    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Runs exactly one discovery pass and saves the cursor
    pub async fn run_pass(&mut self) -> Result<PassReport, HarvestError> {
        // keeping the sender alive means the pass is never cancelled
        let (_never, mut shutdown) = watch::channel(false);
        let report = self.pass(&mut shutdown).await.unwrap_or_default();
        self.state.save()?;
        Ok(report)
    }

    /// Runs discovery passes until shutdown or until `max_passes` passes completed
    ///
    /// The cursor is saved after every completed pass. A pass cut short by the
    /// shutdown signal is not saved, so its pages are requested again next
    /// time; re-admission of the same links is harmless.
    ///
    /// # Returns
    ///
    /// The totals over all completed passes
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        max_passes: Option<u64>,
    ) -> Result<PassReport, HarvestError> {
        let pass_delay = Duration::from_millis(self.config.crawler.pass_delay);
        let mut total = PassReport::default();
        let mut passes = 0u64;

        loop {
            let Some(report) = self.pass(&mut shutdown).await else {
                tracing::info!("Discovery interrupted, cursor left at the last completed pass");
                break;
            };

            self.state.save()?;
            tracing::debug!("Cursor saved to {}", self.state.path().display());
            passes += 1;
            total.merge(&report);
            tracing::info!(
                "Discovery pass {} done: {} queued, {} recent, {} errors ({} listings, {} empty, {} failed)",
                passes,
                report.queued,
                report.recent,
                report.errors,
                report.listings_fetched,
                report.listings_empty,
                report.listings_failed
            );

            if max_passes.is_some_and(|max| passes >= max) {
                break;
            }

            if pause(pass_delay, &mut shutdown).await {
                tracing::info!("Discovery stopped");
                break;
            }
        }

        Ok(total)
    }

    /// One page per source; `None` if shutdown was signalled mid-pass
    async fn pass(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<PassReport> {
        let listing_delay = Duration::from_millis(self.config.crawler.listing_delay);
        let mut report = PassReport::default();

        for index in 0..self.sources.len() {
            if *shutdown.borrow() {
                return None;
            }

            let page = self.state.page_for(&self.sources[index].config);
            if self.visit_listing(&self.sources[index], page, &mut report).await {
                self.state.advance(&self.sources[index].config);
            }

            if pause(listing_delay, shutdown).await {
                return None;
            }
        }

        Some(report)
    }

    /// Fetches one listing page and admits its links
    ///
    /// Returns true if the cursor of the source should advance.
    async fn visit_listing(&self, source: &ListingSource, page: u32, report: &mut PassReport) -> bool {
        let name = &source.config.name;
        let listing_url = source.config.listing_url_for(page);

        let body = match fetch_page(&self.client, &listing_url).await {
            Ok(fetched) => fetched.body,
            Err(e) => {
                tracing::warn!("[{}] listing page {} failed: {}", name, page, e);
                report.listings_failed += 1;
                return false;
            }
        };

        let links = source.matcher.candidate_links(&body, &source.base_url);
        if links.is_empty() {
            tracing::warn!("[{}] listing page {} has no article links", name, page);
            report.listings_empty += 1;
            return false;
        }

        let (mut queued, mut recent, mut errors) = (0u64, 0u64, 0u64);
        for link in &links {
            match self.gate.admit(link, name) {
                Admission::Queued => queued += 1,
                Admission::SkippedRecent => recent += 1,
                Admission::SkippedError(e) => {
                    tracing::debug!("[{}] skipped {}: {}", name, link, e);
                    errors += 1;
                }
            }
        }

        tracing::info!(
            "[{}] page {}: {} links, {} queued, {} recent, {} errors",
            name,
            page,
            links.len(),
            queued,
            recent,
            errors
        );

        report.listings_fetched += 1;
        report.queued += queued;
        report.recent += recent;
        report.errors += errors;
        true
    }
}
