use async_trait::async_trait;
use nd_core::Result;
use reqwest::Client;
use scraper::Html;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::utils::{extract_text, extract_texts, meta_content, parse_url, selector};
use super::{jsonld, ScrapedArticle, Scraper};

const USER_AGENT: &str = concat!("newsdesk/", env!("CARGO_PKG_VERSION"));

/// Generic scraper for server-rendered news sites.
///
/// Discovery takes every same-host link of the front page. Extraction reads
/// OpenGraph/JSON-LD metadata and the paragraphs of the `<article>` element.
#[derive(Debug, Clone)]
pub struct HtmlScraper {
    client: Client,
}

impl HtmlScraper {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Absolute same-host http(s) links of a page, fragments removed.
pub fn extract_links(html: &str, base: &Url) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
    {
        let Ok(mut link) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") || link.host_str() != base.host_str() {
            continue;
        }
        link.set_fragment(None);
        if link.path() == "/" && link.query().is_none() {
            continue;
        }
        let link = link.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    Ok(links)
}

pub fn extract_article(url: &str, html: &str) -> Result<ScrapedArticle> {
    let document = Html::parse_document(html);

    let title = match meta_content(&document, "meta[property='og:title']")? {
        Some(title) => title,
        None => extract_text(&document, "h1")?
            .or(extract_text(&document, "title")?)
            .unwrap_or_default(),
    };

    let mut paragraphs = extract_texts(&document, "article p")?;
    if paragraphs.is_empty() {
        paragraphs = extract_texts(&document, "p")?;
    }

    let mut authors = jsonld::extract_authors(&document);
    if authors.is_empty() {
        authors = meta_content(&document, "meta[name='author']")?
            .map(|a| vec![a])
            .unwrap_or_default();
    }

    let publish_date = jsonld::extract_published(&document).or(
        meta_content(&document, "meta[property='article:published_time']")?
            .as_deref()
            .and_then(jsonld::parse_date),
    );

    // Fall back to the <time> element some sites use instead of metadata.
    let publish_date = match publish_date {
        Some(date) => Some(date),
        None => {
            let time = selector("time[datetime]")?;
            document
                .select(&time)
                .filter_map(|el| el.value().attr("datetime"))
                .find_map(jsonld::parse_date)
        }
    };

    Ok(ScrapedArticle {
        url: url.to_string(),
        title,
        text: paragraphs.join("\n\n"),
        authors,
        publish_date,
    })
}

#[async_trait]
impl Scraper for HtmlScraper {
    fn name(&self) -> &str {
        "html"
    }

    async fn article_urls(&self, root_url: &str) -> Result<Vec<String>> {
        let base = parse_url(root_url)?;
        let html = self.fetch(root_url).await?;
        let links = extract_links(&html, &base)?;
        debug!(root = %root_url, links = links.len(), "Discovered links");
        Ok(links)
    }

    async fn scrape_article(&self, url: &str) -> Result<ScrapedArticle> {
        let html = self.fetch(url).await?;
        extract_article(url, &html)
    }
}
