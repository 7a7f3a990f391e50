use std::sync::Arc;

use futures::future::join_all;
use nd_core::{ArticleStorage, Error, Result, SourceCatalog, SourceSpec, SourcesConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::dedup::IngestionFilter;
use crate::scrapers::Scraper;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Totals of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Links found on the front pages
    pub discovered: usize,
    /// Links left after filtering and deduplication
    pub selected: usize,
    /// New rows written
    pub stored: usize,
    /// Sources or articles that could not be fetched, extracted or stored
    pub failed: usize,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.discovered += other.discovered;
        self.selected += other.selected;
        self.stored += other.stored;
        self.failed += other.failed;
    }
}

enum ArticleOutcome {
    Stored,
    Duplicate,
    Empty,
    Failed,
}

pub struct IngestManager {
    storage: Arc<dyn ArticleStorage>,
    sources: Arc<SourcesConfig>,
    scraper: Arc<dyn Scraper>,
    semaphore: Arc<Semaphore>,
}

impl IngestManager {
    pub fn new(
        storage: Arc<dyn ArticleStorage>,
        sources: Arc<SourcesConfig>,
        scraper: Arc<dyn Scraper>,
    ) -> Self {
        Self {
            storage,
            sources,
            scraper,
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        self
    }

    /// Ingest every configured source, one after another.
    pub async fn ingest_all(&self) -> IngestReport {
        let mut report = IngestReport::default();
        for source in self.sources.all_sources() {
            match self.ingest_source(source).await {
                Ok(site_report) => report.merge(site_report),
                Err(e) => {
                    error!(site = %source.name, url = %source.url, error = %e, "Source discovery failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            discovered = report.discovered,
            selected = report.selected,
            stored = report.stored,
            failed = report.failed,
            "Finished ingestion"
        );
        report
    }

    /// Ingest a single source by (case-insensitive) site name.
    pub async fn ingest_site(&self, site_name: &str) -> Result<IngestReport> {
        let source = self
            .sources
            .source(site_name)
            .ok_or_else(|| Error::Config(format!("Unknown source: {}", site_name)))?;
        self.ingest_source(source).await
    }

    async fn ingest_source(&self, source: &SourceSpec) -> Result<IngestReport> {
        info!(site = %source.name, "🦗 Scraping {}...", source.name);
        let discovered = self.scraper.article_urls(&source.url).await?;

        let keywords = self.sources.filter_for(&source.name).unwrap_or_default();
        let filter = IngestionFilter::for_source(&source.url, &keywords);
        let processed = self.storage.urls_for_site(&source.name).await?;

        let mut report = IngestReport {
            discovered: discovered.len(),
            ..Default::default()
        };
        let selected = filter.select_new_urls(discovered, &processed);
        report.selected = selected.len();
        debug!(site = %source.name, selected = report.selected, "Selected new links");

        let outcomes = join_all(
            selected
                .into_iter()
                .map(|url| async move { self.ingest_article(source, &url).await }),
        )
        .await;
        for outcome in outcomes {
            match outcome {
                ArticleOutcome::Stored => report.stored += 1,
                ArticleOutcome::Failed => report.failed += 1,
                ArticleOutcome::Duplicate | ArticleOutcome::Empty => {}
            }
        }

        info!(
            site = %source.name,
            stored = report.stored,
            failed = report.failed,
            "✅ Finished scraping {}",
            source.name
        );
        Ok(report)
    }

    async fn ingest_article(&self, source: &SourceSpec, url: &str) -> ArticleOutcome {
        let scraped = {
            let _permit = match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(url = %url, error = %e, "Scrape queue closed");
                    return ArticleOutcome::Failed;
                }
            };
            match self.scraper.scrape_article(url).await {
                Ok(scraped) => scraped,
                Err(e) => {
                    warn!(url = %url, site = %source.name, error = %e, "Failed to scrape article");
                    return ArticleOutcome::Failed;
                }
            }
        };

        if scraped.text.trim().is_empty() {
            debug!(url = %url, "No article text; skipping");
            return ArticleOutcome::Empty;
        }

        match self
            .storage
            .insert_if_absent(&scraped.into_new_article(&source.name))
            .await
        {
            Ok(true) => ArticleOutcome::Stored,
            Ok(false) => ArticleOutcome::Duplicate,
            Err(e) => {
                error!(url = %url, site = %source.name, error = %e, "Failed to store article");
                ArticleOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::ScrapedArticle;
    use async_trait::async_trait;
    use nd_core::UNSCORED;
    use nd_storage::InMemoryStorage;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SOURCES: &str = r#"
categories:
  - name: World
    sources:
      - name: Daily
        url: https://daily.test
        filter: ["cdn.daily.test/story"]
      - name: Broken
        url: https://broken.test
"#;

    #[derive(Default)]
    struct FakeScraper {
        fronts: HashMap<String, Vec<String>>,
        pages: HashMap<String, ScrapedArticle>,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        fn name(&self) -> &str {
            "fake"
        }

        async fn article_urls(&self, root_url: &str) -> Result<Vec<String>> {
            self.fronts
                .get(root_url)
                .cloned()
                .ok_or_else(|| Error::Scraping(format!("unreachable: {}", root_url)))
        }

        async fn scrape_article(&self, url: &str) -> Result<ScrapedArticle> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Scraping(format!("404: {}", url)))
        }
    }

    fn page(url: &str, text: &str) -> (String, ScrapedArticle) {
        (
            url.to_string(),
            ScrapedArticle {
                url: url.to_string(),
                title: format!("Title {}", url),
                text: text.to_string(),
                authors: vec!["Staff".to_string()],
                publish_date: None,
            },
        )
    }

    fn scraper() -> FakeScraper {
        FakeScraper {
            fronts: HashMap::from([(
                "https://daily.test".to_string(),
                vec![
                    "https://daily.test/a".to_string(),
                    "https://daily.test/b".to_string(),
                    "https://daily.test/empty".to_string(),
                    "https://daily.test/missing".to_string(),
                    "https://cdn.daily.test/story/c".to_string(),
                    "https://ads.test/x".to_string(),
                ],
            )]),
            pages: HashMap::from([
                page("https://daily.test/a", "Alpha text"),
                page("https://daily.test/b", "Beta text"),
                page("https://daily.test/empty", "   "),
                page("https://cdn.daily.test/story/c", "Gamma text"),
            ]),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn manager(storage: Arc<InMemoryStorage>, scraper: Arc<FakeScraper>) -> IngestManager {
        IngestManager::new(
            storage,
            Arc::new(SourcesConfig::from_yaml_str(SOURCES).unwrap()),
            scraper,
        )
    }

    #[tokio::test]
    async fn test_ingest_all_isolates_failures() {
        let storage = Arc::new(InMemoryStorage::new());
        let scraper = Arc::new(scraper());
        let report = manager(storage.clone(), scraper.clone()).ingest_all().await;

        assert_eq!(report.discovered, 6);
        assert_eq!(report.selected, 5);
        assert_eq!(report.stored, 3);
        // the missing page plus the unreachable "Broken" source
        assert_eq!(report.failed, 2);

        let stored = storage.get_by_url("https://cdn.daily.test/story/c").await.unwrap().unwrap();
        assert_eq!(stored.site_name, "Daily");
        assert_eq!(stored.score, UNSCORED);
        assert!(storage.get_by_url("https://daily.test/empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_pass_skips_processed_urls() {
        let storage = Arc::new(InMemoryStorage::new());
        let scraper = Arc::new(scraper());
        let manager = manager(storage.clone(), scraper.clone());

        manager.ingest_site("daily").await.unwrap();
        scraper.fetched.lock().unwrap().clear();
        let report = manager.ingest_site("Daily").await.unwrap();

        assert_eq!(report.stored, 0);
        let mut refetched = scraper.fetched.lock().unwrap().clone();
        refetched.sort();
        // Only pages that never made it into storage are tried again.
        assert_eq!(
            refetched,
            vec!["https://daily.test/empty", "https://daily.test/missing"]
        );
        assert_eq!(storage.urls_for_site("Daily").await.unwrap().len(), 3);
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn test_ingest_futures_are_send() {
        let manager = Arc::new(manager(Arc::new(InMemoryStorage::new()), Arc::new(scraper())));
        assert_send(manager.ingest_all());
        assert_send(manager.ingest_site("Daily"));

        let report = tokio::spawn({
            let manager = manager.clone();
            async move { manager.ingest_site("Daily").await }
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.stored, 3);
    }

    #[tokio::test]
    async fn test_unknown_site_is_config_error() {
        let storage = Arc::new(InMemoryStorage::new());
        let err = manager(storage, Arc::new(scraper()))
            .ingest_site("Nope")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
