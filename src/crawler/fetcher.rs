//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with the configured identification headers
//! - GET requests for listing and article pages
//! - Error classification

use crate::config::HttpConfig;
use crate::{ConfigError, HarvestError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    /// Page body
    pub body: String,
}

/// Why a page could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(String),
}

impl FetchError {
    /// Whether trying the same request later could plausibly succeed
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | Connection failure | yes |
    /// | HTTP 5xx | yes |
    /// | HTTP 429 | yes |
    /// | Any other status | no |
    /// | Other transport/body errors | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status(code) => *code >= 500 || *code == StatusCode::TOO_MANY_REQUESTS.as_u16(),
            Self::Transport(_) | Self::Body(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Every request carries the configured `User-Agent` and `Accept-Language`
/// headers; redirects are followed.
///
/// # Arguments
///
/// * `config` - The request identification settings
/// * `timeout` - Timeout for a whole request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(HarvestError)` - A header value is invalid or the client failed to build
///
/// # Example
///
/// ```no_run
/// use harvest_robot::config::HttpConfig;
/// use harvest_robot::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&HttpConfig::default(), Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig, timeout: Duration) -> Result<Client, HarvestError> {
    let accept_language = HeaderValue::from_str(&config.accept_language).map_err(|e| {
        ConfigError::Validation(format!(
            "accept-language '{}' is not a valid header value: {}",
            config.accept_language, e
        ))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, accept_language);

    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Fetches a page with a single GET request
///
/// Anything other than HTTP 200 with a readable body is an error; retrying
/// is left to the caller.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
///
/// # Returns
///
/// * `Ok(FetchedPage)` - Status 200 and the decoded body
/// * `Err(FetchError)` - Transport failure or any other status
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, FetchError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status(status.as_u16()));
    }

    let final_url = response.url().to_string();
    let body = response.text().await?;

    Ok(FetchedPage {
        url: final_url,
        body,
    })
}
