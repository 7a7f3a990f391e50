use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nd_core::{NewArticle, Result};
use serde::{Deserialize, Serialize};

pub mod html;
pub mod jsonld;

pub use html::HtmlScraper;

/// What extraction produced for one article page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub url: String,
    pub title: String,
    pub text: String,
    pub authors: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

impl ScrapedArticle {
    pub fn into_new_article(self, site_name: &str) -> NewArticle {
        NewArticle {
            site_name: site_name.to_string(),
            url: self.url,
            title: self.title,
            text: self.text,
            authors: self.authors,
            publish_date: self.publish_date,
        }
    }
}

/// Link discovery and article extraction for a news site.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Returns candidate article URLs linked from the source's front page
    async fn article_urls(&self, root_url: &str) -> Result<Vec<String>>;

    /// Downloads and extracts a single article
    async fn scrape_article(&self, url: &str) -> Result<ScrapedArticle>;
}

/// Common utilities for scrapers
pub(crate) mod utils {
    use nd_core::{Error, Result};
    use scraper::{ElementRef, Html, Selector};
    use url::Url;

    pub fn parse_url(url: &str) -> Result<Url> {
        Url::parse(url).map_err(|e| Error::Scraping(format!("Failed to parse URL: {}", e)))
    }

    pub fn selector(css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| Error::Scraping(format!("Invalid selector {}: {}", css, e)))
    }

    pub fn element_text(el: ElementRef<'_>) -> String {
        el.text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text of the first element matching `css`, if it is not blank.
    pub fn extract_text(document: &Html, css: &str) -> Result<Option<String>> {
        let selector = selector(css)?;
        Ok(document
            .select(&selector)
            .map(element_text)
            .find(|t| !t.is_empty()))
    }

    pub fn extract_texts(document: &Html, css: &str) -> Result<Vec<String>> {
        let selector = selector(css)?;
        Ok(document
            .select(&selector)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect())
    }

    pub fn meta_content(document: &Html, css: &str) -> Result<Option<String>> {
        let selector = selector(css)?;
        Ok(document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .find(|c| !c.is_empty()))
    }
}
