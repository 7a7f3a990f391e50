use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Article, NewArticle, Page, PageQuery, ScoreResult};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Store an article unless its URL is already present.
    /// Returns whether a row was written.
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool>;

    /// Set score and summary, but only while the article is still unscored.
    /// Returns whether the row was updated.
    async fn update_score(&self, url: &str, result: &ScoreResult) -> Result<bool>;

    /// Snapshot of every article that has not been scored yet
    async fn fetch_unscored(&self) -> Result<Vec<Article>>;

    /// Ranked page plus total match count. `site_names` is never empty here.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page>;

    /// URLs already stored for a site
    async fn urls_for_site(&self, site_name: &str) -> Result<HashSet<String>>;

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>>;

    /// Retention sweep. Returns the number of deleted rows.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Ranked view of a site group.
    ///
    /// Order is scored before unscored, then score descending, then the
    /// backend's tiebreak hash of the id. An empty site set yields an empty
    /// page without touching the backend.
    async fn page(&self, query: &PageQuery) -> Result<Page> {
        if query.site_names.is_empty() {
            return Ok(Page::default());
        }
        self.fetch_page(query).await
    }
}
