//! URL handling module for Harvest-Robot
//!
//! This module provides the article identity normalizer and the table-driven
//! rules that pick article links out of listing pages.

mod links;
mod normalize;

// Re-export main functions
pub use links::{resolve_link, LinkMatcher};
pub use normalize::{normalize_url, Normalizer};
