use crate::config::types::{Config, CrawlerConfig, LinkRule, SourceConfig, StorageConfig};
use crate::extract::ExtractionRules;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates crawl policy values
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.recrawl_interval == 0 {
        return Err(ConfigError::Validation(
            "recrawl_interval must be > 0 seconds".to_string(),
        ));
    }

    if config.min_text_length == 0 {
        return Err(ConfigError::Validation(
            "min_text_length must be > 0".to_string(),
        ));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be > 0 seconds".to_string(),
        ));
    }

    if config.delay_min > config.delay_max {
        return Err(ConfigError::Validation(format!(
            "delay_min ({}ms) must not exceed delay_max ({}ms)",
            config.delay_min, config.delay_max
        )));
    }

    Ok(())
}

/// Validates persistence paths
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.cursor_path.is_empty() {
        return Err(ConfigError::Validation(
            "cursor_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the source table
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for source in sources {
        validate_source_name(&source.name)?;
        if !seen.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
        validate_source(source)?;
    }

    Ok(())
}

/// Source names are stored with every row, keep them simple
fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "source name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "source name must contain only lowercase letters, digits, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}

fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    if !source.listing_url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "listing_url of '{}' must contain a {{page}} placeholder",
            source.name
        )));
    }

    validate_http_url(&source.listing_url_for(source.start_page), &source.name)?;
    validate_http_url(&source.base_url, &source.name)?;

    if source.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start_page of '{}' must be >= 1",
            source.name
        )));
    }

    match &source.links {
        LinkRule::Path { prefix, slashes } => {
            if !prefix.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "path prefix of '{}' must start with '/', got '{}'",
                    source.name, prefix
                )));
            }
            if *slashes == 0 {
                return Err(ConfigError::Validation(format!(
                    "path rule of '{}' must expect at least one slash",
                    source.name
                )));
            }
        }
        LinkRule::Selector { selector } => validate_selector(selector)?,
    }

    if let Some(rules) = &source.extract {
        validate_extraction_rules(rules)?;
    }

    Ok(())
}

fn validate_http_url(raw: &str, source: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("'{}' in source '{}': {}", raw, source, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "'{}' in source '{}' must use http or https",
            raw, source
        )));
    }

    Ok(())
}

/// Validates every selector of an inline rule set
pub(crate) fn validate_extraction_rules(rules: &ExtractionRules) -> Result<(), ConfigError> {
    if rules.sections.is_empty() {
        return Err(ConfigError::Validation(
            "extraction rules need at least one body section".to_string(),
        ));
    }

    let all_selectors = rules
        .title
        .iter()
        .chain(rules.strip.iter())
        .chain(rules.sections.iter().flat_map(|s| s.selectors.iter().chain(s.within.iter())));

    for selector in all_selectors {
        validate_selector(selector)?;
    }

    Ok(())
}

/// Checks that a CSS selector compiles
pub(crate) fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}
