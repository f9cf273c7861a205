use crate::UrlError;
use url::Url;

/// Canonicalizes article URLs into the identity key shared by the queue and
/// the document store
///
/// Every call site must go through the same `Normalizer`; two components using
/// different settings would disagree on what "the same article" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    upgrade_http: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { upgrade_http: true }
    }
}

impl Normalizer {
    /// Creates a normalizer
    ///
    /// # Arguments
    ///
    /// * `upgrade_http` - Fold `http://` into `https://`. Disabled in tests that
    ///   talk to plain-HTTP mock servers.
    pub fn new(upgrade_http: bool) -> Self {
        Self { upgrade_http }
    }

    /// Normalizes a URL
    ///
    /// # Normalization Steps
    ///
    /// 1. Parse the URL; reject if malformed, not http(s), or without a host
    /// 2. Lowercase the scheme (the parser does this) and optionally fold http into https
    /// 3. Lowercase the host
    /// 4. Drop userinfo, query string and fragment
    /// 5. Keep an explicit non-default port
    /// 6. Strip the trailing slash from the path; the root path becomes empty.
    ///    A run of trailing slashes is stripped as a whole so that the result is
    ///    a fixed point (`normalize(normalize(u)) == normalize(u)`)
    ///
    /// The result is a string rather than a `Url` because step 6 produces forms
    /// (`https://example.com`) that `Url` would re-expand.
    ///
    /// # Examples
    ///
    /// ```
    /// use harvest_robot::url::Normalizer;
    ///
    /// let normalizer = Normalizer::default();
    /// assert_eq!(
    ///     normalizer.normalize("HTTP://Site.COM/article/1/?utm=x#top").unwrap(),
    ///     "https://site.com/article/1"
    /// );
    /// ```
    pub fn normalize(&self, raw: &str) -> Result<String, UrlError> {
        let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

        let scheme = match url.scheme() {
            "https" => "https",
            "http" if self.upgrade_http => "https",
            "http" => "http",
            other => {
                return Err(UrlError::InvalidScheme(format!(
                    "Only HTTP and HTTPS schemes are supported, got: {}",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(UrlError::MissingHost)?
            .to_lowercase();

        // Url already drops ports that are the default for the parsed scheme;
        // after an http -> https fold an explicit :443 would be redundant too
        let port = match url.port() {
            Some(443) if scheme == "https" => String::new(),
            Some(port) => format!(":{}", port),
            None => String::new(),
        };

        let path = url.path();
        let path = path.trim_end_matches('/');

        Ok(format!("{}://{}{}{}", scheme, host, port, path))
    }
}

/// Normalizes a URL with the default settings (http folded into https)
///
/// # Examples
///
/// ```
/// use harvest_robot::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTP://X.com/a/").unwrap(),
///     normalize_url("http://x.com/a").unwrap()
/// );
/// ```
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    Normalizer::default().normalize(raw)
}
