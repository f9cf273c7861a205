use crate::extract::ExtractionRules;
use serde::Deserialize;

/// Main configuration structure for Harvest-Robot
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub storage: StorageConfig,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceConfig>,
}

/// Crawl policy: intervals, delays and thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum age (seconds) of a stored article before it may be queued again
    #[serde(rename = "recrawl-interval")]
    pub recrawl_interval: u64,

    /// Articles whose extracted text is not longer than this (in characters) are dropped
    #[serde(rename = "min-text-length", default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Timeout for a single HTTP request (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Lower bound of the random delay before each article request (milliseconds)
    #[serde(rename = "delay-min")]
    pub delay_min: u64,

    /// Upper bound of the random delay before each article request (milliseconds)
    #[serde(rename = "delay-max")]
    pub delay_max: u64,

    /// Pause after each listing page request (milliseconds)
    #[serde(rename = "listing-delay", default = "default_listing_delay")]
    pub listing_delay: u64,

    /// Pause after a full discovery pass over all sources (milliseconds)
    #[serde(rename = "pass-delay", default = "default_pass_delay")]
    pub pass_delay: u64,

    /// How many times a transiently failed article is put back in the queue
    #[serde(rename = "fetch-retries", default)]
    pub fetch_retries: u32,

    /// Fold `http` into `https` when normalizing URLs
    #[serde(rename = "upgrade-http", default = "default_true")]
    pub upgrade_http: bool,
}

/// HTTP request identification
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

/// Persistence locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file holding articles and the queue
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON file holding the per-source listing cursor
    #[serde(rename = "cursor-path")]
    pub cursor_path: String,

    /// Directory the `export` command writes plain-text files into
    #[serde(rename = "corpus-dir", default = "default_corpus_dir")]
    pub corpus_dir: String,
}

/// One site to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Source tag stored with every task and article
    pub name: String,

    /// Listing page URL template; `{page}` is replaced by the page index
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Base for resolving relative article links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// First listing page when no cursor has been saved yet
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// How article links are told apart from navigation on a listing page
    pub links: LinkRule,

    /// Built-in extraction strategy to use (defaults to the source name)
    #[serde(default)]
    pub extractor: Option<String>,

    /// Inline extraction rules; take precedence over `extractor`
    #[serde(default)]
    pub extract: Option<ExtractionRules>,
}

impl SourceConfig {
    /// Builds the listing URL for a page index
    pub fn listing_url_for(&self, page: u32) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }

    /// Name of the extraction strategy this source dispatches to
    pub fn extractor_name(&self) -> &str {
        self.extractor.as_deref().unwrap_or(&self.name)
    }
}

/// Candidate article link rule for a listing page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LinkRule {
    /// Same-host anchors whose path starts with `prefix` and contains exactly `slashes` slashes
    Path { prefix: String, slashes: usize },

    /// Anchors matched by a CSS selector
    Selector { selector: String },
}

fn default_min_text_length() -> usize {
    200
}

fn default_request_timeout() -> u64 {
    10
}

fn default_listing_delay() -> u64 {
    1000
}

fn default_pass_delay() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_start_page() -> u32 {
    1
}

fn default_corpus_dir() -> String {
    "./corpus".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_accept_language() -> String {
    "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}
