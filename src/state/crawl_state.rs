use crate::config::SourceConfig;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The discovery cursor: next listing page to request, per source
///
/// Persisted as a flat JSON object (`{"b17": 12, "psychologies": 4}`). Sources
/// missing from the file start at their configured `start-page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    path: PathBuf,
    pages: Pages,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
struct Pages(BTreeMap<String, u32>);

impl CrawlState {
    /// Creates an empty cursor that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pages: Pages::default(),
        }
    }

    /// Loads the cursor file
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlState)` - The saved cursor, or an empty one if the file does not exist
    /// * `Err(ConfigError::Cursor)` - The file exists but is not a valid cursor
    /// * `Err(ConfigError::Io)` - The file could not be read
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No crawl cursor at {}, starting from the first pages", path.display());
                return Ok(Self::new(path));
            }
            Err(e) => return Err(e.into()),
        };

        let pages: Pages = serde_json::from_str(&content).map_err(|e| ConfigError::Cursor {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some((source, _)) = pages.0.iter().find(|(_, page)| **page == 0) {
            return Err(ConfigError::Cursor {
                path: path.display().to_string(),
                message: format!("page of '{}' must be >= 1", source),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            pages,
        })
    }

    /// Writes the cursor file
    ///
    /// The new content goes to a sibling temp file that is then renamed over
    /// the old one, so a crash leaves either the old or the new cursor.
    pub fn save(&self) -> crate::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_string_pretty(&self.pages)?)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!("Saved crawl cursor to {}", self.path.display());
        Ok(())
    }

    /// Next listing page for a source
    pub fn page_for(&self, source: &SourceConfig) -> u32 {
        self.pages
            .0
            .get(&source.name)
            .copied()
            .unwrap_or(source.start_page)
    }

    /// Moves a source on to its next listing page
    pub fn advance(&mut self, source: &SourceConfig) -> u32 {
        let next = self.page_for(source).saturating_add(1);
        self.pages.0.insert(source.name.clone(), next);
        next
    }

    /// Path the cursor is saved to
    pub fn path(&self) -> &Path {
        &self.path
    }
}
