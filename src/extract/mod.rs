//! Article extraction for Harvest-Robot
//!
//! Each source is paired with an [`Extractor`] that turns a parsed article page
//! into a title and body text. Strategies are looked up by source name in an
//! [`ExtractorRegistry`]; the built-in rule sets cover the shipped sources and
//! the configuration file can add rule sets for new ones.

mod rules;
mod text;

pub use rules::{ExtractionRules, SectionRule, SelectorExtractor, FALLBACK_TITLE};
pub use text::element_text;

use crate::config::Config;
use crate::ConfigError;
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;

/// Title and body text pulled from an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

/// A per-source strategy for reading an article page
pub trait Extractor: Send + Sync {
    /// Extracts the title and body text from a parsed page
    ///
    /// Never fails: markup that does not match yields the fallback title and
    /// empty text, which the worker then treats as too short to keep.
    fn extract(&self, document: &Html) -> Extracted;
}

/// Maps source names to extraction strategies
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `b17` and `psychologies` strategies
    pub fn with_builtins() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.register("b17", Arc::new(SelectorExtractor::new(&ExtractionRules::b17())?));
        registry.register(
            "psychologies",
            Arc::new(SelectorExtractor::new(&ExtractionRules::psychologies())?),
        );
        Ok(registry)
    }

    /// Builds the registry for every configured source
    ///
    /// A source's inline `[source.extract]` rules take precedence; otherwise the
    /// built-in strategy named by its `extractor` key (or its own name) is used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingExtractor`] when a source has neither.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let builtins = Self::with_builtins()?;
        let mut registry = Self::new();

        for source in &config.sources {
            let extractor = match &source.extract {
                Some(rules) => Arc::new(SelectorExtractor::new(rules)?) as Arc<dyn Extractor>,
                None => builtins
                    .get(source.extractor_name())
                    .ok_or_else(|| ConfigError::MissingExtractor(source.name.clone()))?,
            };
            registry.register(&source.name, extractor);
        }

        Ok(registry)
    }

    /// Registers or replaces the strategy for a source
    pub fn register(&mut self, source: &str, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(source.to_string(), extractor);
    }

    /// Looks up the strategy for a source
    pub fn get(&self, source: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(source).cloned()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<_> = self.extractors.keys().collect();
        sources.sort();
        f.debug_struct("ExtractorRegistry")
            .field("sources", &sources)
            .finish()
    }
}
