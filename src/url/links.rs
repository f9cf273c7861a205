use crate::config::LinkRule;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A compiled candidate-link rule for one source
///
/// Built once from the source's [`LinkRule`] so selectors are parsed a single
/// time rather than on every listing page.
#[derive(Debug, Clone)]
pub enum LinkMatcher {
    /// Same-host anchors whose path has `prefix` and exactly `slashes` slashes
    Path { prefix: String, slashes: usize },

    /// Anchors matched by a CSS selector
    Selector(Selector),
}

impl LinkMatcher {
    /// Compiles a configured rule
    pub fn compile(rule: &LinkRule) -> Result<Self, ConfigError> {
        match rule {
            LinkRule::Path { prefix, slashes } => Ok(Self::Path {
                prefix: prefix.clone(),
                slashes: *slashes,
            }),
            LinkRule::Selector { selector } => Selector::parse(selector)
                .map(Self::Selector)
                .map_err(|e| ConfigError::InvalidSelector {
                    selector: selector.clone(),
                    message: format!("{:?}", e),
                }),
        }
    }

    /// Extracts candidate article links from a listing page
    ///
    /// Returned links are absolute, fragment-free, deduplicated, and in
    /// document order. Navigation chrome that does not satisfy the rule is
    /// dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use harvest_robot::config::LinkRule;
    /// use harvest_robot::url::LinkMatcher;
    /// use url::Url;
    ///
    /// let rule = LinkRule::Path { prefix: "/article/".to_string(), slashes: 3 };
    /// let matcher = LinkMatcher::compile(&rule).unwrap();
    /// let base = Url::parse("https://www.b17.ru").unwrap();
    /// let html = r#"<a href="/article/42/">Read</a><a href="/article/">All</a>"#;
    ///
    /// assert_eq!(
    ///     matcher.candidate_links(html, &base),
    ///     vec!["https://www.b17.ru/article/42/".to_string()]
    /// );
    /// ```
    pub fn candidate_links(&self, html: &str, base_url: &Url) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        let anchors = match self {
            Self::Path { .. } => {
                let Ok(selector) = Selector::parse("a[href]") else {
                    return links;
                };
                collect_hrefs(&document, &selector)
            }
            Self::Selector(selector) => collect_hrefs(&document, selector),
        };

        for href in anchors {
            let Some(resolved) = resolve_link(&href, base_url) else {
                continue;
            };

            if let Self::Path { prefix, slashes } = self {
                if resolved.host_str() != base_url.host_str() {
                    continue;
                }
                let path = resolved.path();
                if !path.starts_with(prefix.as_str()) || path.matches('/').count() != *slashes {
                    continue;
                }
            }

            let link = resolved.to_string();
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }

        links
    }
}

fn collect_hrefs(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Resolves a link href to an absolute URL without its fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);

    Some(absolute)
}
