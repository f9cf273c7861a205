//! Crawler module: discovery, admission and fetching
//!
//! This module contains the two long-running loops of the harvester and the
//! pieces they share:
//! - HTTP fetching and error classification
//! - The admission gate between discovery and the queue
//! - The frontier walking paginated listings
//! - The fetch worker draining the queue into the document store
//!
//! The loops never talk to each other directly; they share only the queue and
//! the document store.

mod admission;
mod fetcher;
mod frontier;
mod worker;

pub use admission::{Admission, AdmissionGate, AdmitError};
pub use fetcher::{build_http_client, fetch_page, FetchError, FetchedPage};
pub use frontier::{Frontier, PassReport};
pub use worker::{FetchWorker, TaskOutcome, WorkerReport};

use std::time::Duration;
use tokio::sync::watch;

/// Sleeps for `duration` unless shutdown is signalled first
///
/// # Returns
///
/// `true` if shutdown was signalled (before or during the sleep)
pub(crate) async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // sender gone, no shutdown can arrive any more
                    (&mut sleep).await;
                    return false;
                }
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
