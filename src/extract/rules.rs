//! Selector-driven extraction rules
//!
//! A rule set names, per source, where the headline lives, which blocks make
//! up the article body, and which subtrees inside the body are noise. The two
//! sites the harvester ships with are expressed as rule sets rather than code,
//! and a new site can declare its own set in the configuration file.

use crate::extract::text::element_text;
use crate::extract::{Extracted, Extractor};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

/// Title used when none of the title selectors match
pub const FALLBACK_TITLE: &str = "No Title";

/// Structural rules for one source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractionRules {
    /// Title selectors, tried in order
    #[serde(default)]
    pub title: Vec<String>,

    /// Title used when no title selector matches
    #[serde(rename = "fallback-title", default = "default_fallback_title")]
    pub fallback_title: String,

    /// Body sections, concatenated in order
    pub sections: Vec<SectionRule>,

    /// Subtrees excluded from body text
    #[serde(default)]
    pub strip: Vec<String>,
}

/// One part of an article body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionRule {
    /// Alternative selectors; the first one that matches anything wins
    pub selectors: Vec<String>,

    /// Take every match instead of only the first
    #[serde(default)]
    pub all: bool,

    /// Joins the text pieces inside one match
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Only look inside the first element this selector matches
    #[serde(default)]
    pub within: Option<String>,
}

impl SectionRule {
    /// A section matched anywhere in the page, pieces joined with a space
    pub fn new(selectors: &[&str], all: bool) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            all,
            separator: default_separator(),
            within: None,
        }
    }
}

fn default_fallback_title() -> String {
    FALLBACK_TITLE.to_string()
}

fn default_separator() -> String {
    " ".to_string()
}

impl ExtractionRules {
    /// Rules for b17.ru article pages
    pub fn b17() -> Self {
        Self {
            title: vec!["h1.from_bb_h1".to_string(), "h1".to_string()],
            fallback_title: default_fallback_title(),
            // the site really does ship the misspelled attribute on some pages
            sections: vec![SectionRule::new(
                &[
                    r#"div[itmprp="articleBody"]"#,
                    r#"div[itemprop="articleBody"]"#,
                    "div#article_body",
                ],
                false,
            )],
            strip: vec![
                "div.art_start".to_string(),
                "script".to_string(),
                "style".to_string(),
            ],
        }
    }

    /// Rules for psychologies.ru article pages
    pub fn psychologies() -> Self {
        Self {
            title: vec!["h1.article__title".to_string()],
            fallback_title: default_fallback_title(),
            sections: vec![
                SectionRule {
                    separator: String::new(),
                    ..SectionRule::new(&["p.article__lead-paragraph"], false)
                },
                SectionRule {
                    within: Some(r#"section[itemprop="articleBody"]"#.to_string()),
                    ..SectionRule::new(&["div.article__block_type-text"], true)
                },
            ],
            strip: vec![],
        }
    }
}

/// Extraction strategy driven by an [`ExtractionRules`] set
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    title: Vec<Selector>,
    fallback_title: String,
    sections: Vec<CompiledSection>,
    strip: Vec<Selector>,
}

#[derive(Debug, Clone)]
struct CompiledSection {
    selectors: Vec<Selector>,
    all: bool,
    separator: String,
    within: Option<Selector>,
}

impl SelectorExtractor {
    /// Compiles a rule set
    pub fn new(rules: &ExtractionRules) -> Result<Self, ConfigError> {
        Ok(Self {
            title: compile_all(&rules.title)?,
            fallback_title: rules.fallback_title.clone(),
            sections: rules
                .sections
                .iter()
                .map(|section| {
                    Ok(CompiledSection {
                        selectors: compile_all(&section.selectors)?,
                        all: section.all,
                        separator: section.separator.clone(),
                        within: section.within.as_deref().map(compile).transpose()?,
                    })
                })
                .collect::<Result<_, ConfigError>>()?,
            strip: compile_all(&rules.strip)?,
        })
    }

    fn extract_title(&self, document: &Html) -> String {
        self.title
            .iter()
            .find_map(|selector| document.select(selector).next())
            .map(|element| element_text(element, "", &[]))
            .unwrap_or_else(|| self.fallback_title.clone())
    }

    fn extract_body(&self, document: &Html) -> String {
        let mut parts = Vec::new();

        for section in &self.sections {
            let scope = match &section.within {
                Some(within) => match document.select(within).next() {
                    Some(root) => Some(root),
                    None => continue,
                },
                None => None,
            };

            let Some(matches) = section
                .selectors
                .iter()
                .map(|selector| select_in(document, scope, selector))
                .find(|matches| !matches.is_empty())
            else {
                continue;
            };

            let take = if section.all { matches.len() } else { 1 };
            parts.extend(
                matches
                    .into_iter()
                    .take(take)
                    .map(|e| element_text(e, &section.separator, &self.strip))
                    .filter(|t| !t.is_empty()),
            );
        }

        parts.join(" ")
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, document: &Html) -> Extracted {
        Extracted {
            title: self.extract_title(document),
            text: self.extract_body(document),
        }
    }
}

fn select_in<'a>(
    document: &'a Html,
    scope: Option<ElementRef<'a>>,
    selector: &Selector,
) -> Vec<ElementRef<'a>> {
    match scope {
        Some(root) => root.select(selector).collect(),
        None => document.select(selector).collect(),
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn compile_all(selectors: &[String]) -> Result<Vec<Selector>, ConfigError> {
    selectors.iter().map(|s| compile(s)).collect()
}
