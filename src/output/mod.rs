//! Output module for reports and exports
//!
//! This module handles:
//! - Recording and printing harvest statistics
//! - Exporting stored articles as a plain-text corpus

mod corpus;
pub mod stats;

pub use corpus::export_corpus;
pub use stats::{format_statistics, load_statistics, print_statistics, HarvestStatistics};
