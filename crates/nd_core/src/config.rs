//! Source catalog loaded from `sources.yaml`.
//!
//! ```yaml
//! categories:
//!   - name: Tech
//!     sources:
//!       - name: Hacker Blog
//!         url: https://blog.example.com
//!         preference: systems programming, databases
//!         language: English
//!         filter: [/posts/]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Preference;
use crate::{Error, Result};

/// Read-only lookup of per-site configuration. Names match case-insensitively.
pub trait SourceCatalog: Send + Sync {
    /// Reader preference for a site; `None` means the site is not scored.
    fn preference_for(&self, site_name: &str) -> Option<Preference>;

    /// Keyword allow-list for a site; `None` means the site is unknown.
    fn filter_for(&self, site_name: &str) -> Option<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub preference: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub filter: Vec<String>,
}

impl SourcesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read sources file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: SourcesConfig = serde_yaml::from_str(raw)?;
        for source in config.all_sources() {
            url::Url::parse(&source.url)?;
        }
        Ok(config)
    }

    pub fn categories(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Site names of a category, `None` for an unknown category.
    pub fn sites_in_category(&self, name: &str) -> Option<Vec<String>> {
        self.category(name)
            .map(|c| c.sources.iter().map(|s| s.name.clone()).collect())
    }

    pub fn all_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.categories.iter().flat_map(|c| c.sources.iter())
    }

    pub fn all_site_names(&self) -> Vec<String> {
        self.all_sources().map(|s| s.name.clone()).collect()
    }

    pub fn source(&self, site_name: &str) -> Option<&SourceSpec> {
        self.all_sources()
            .find(|s| s.name.eq_ignore_ascii_case(site_name))
    }
}

impl SourceCatalog for SourcesConfig {
    fn preference_for(&self, site_name: &str) -> Option<Preference> {
        let source = self.source(site_name)?;
        let text = source.preference.as_deref().map(str::trim)?;
        if text.is_empty() {
            return None;
        }
        Some(Preference::new(text, source.language.as_deref()))
    }

    fn filter_for(&self, site_name: &str) -> Option<Vec<String>> {
        self.source(site_name).map(|s| s.filter.clone())
    }
}
