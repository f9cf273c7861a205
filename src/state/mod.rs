//! State module for tracking discovery progress
//!
//! # Components
//!
//! - `CrawlState`: the persisted per-source listing page cursor

mod crawl_state;

pub use crawl_state::CrawlState;
