use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nd_core::{
    Article, ArticleStorage, NewArticle, Page, PageQuery, Result, ScoreResult, TiebreakHash,
    UNSCORED,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<Article>,
    next_id: i64,
}

impl MemoryStore {
    pub fn insert_if_absent(&mut self, article: &NewArticle) -> bool {
        if self.articles.iter().any(|a| a.url == article.url) {
            return false;
        }
        self.next_id += 1;
        self.articles.push(Article {
            id: self.next_id,
            site_name: article.site_name.clone(),
            url: article.url.clone(),
            title: article.title.clone(),
            text: article.text.clone(),
            authors: article.authors.clone(),
            publish_date: article.publish_date,
            score: UNSCORED,
            summary: None,
            created_at: Utc::now(),
        });
        true
    }

    pub fn update_score(&mut self, url: &str, result: &ScoreResult) -> bool {
        match self
            .articles
            .iter_mut()
            .find(|a| a.url == url && !a.is_scored())
        {
            Some(article) => {
                article.score = result.score();
                article.summary = Some(result.summary().to_string());
                true
            }
            None => false,
        }
    }

    pub fn page(&self, query: &PageQuery, hash: &TiebreakHash) -> Page {
        let mut matching: Vec<&Article> =
            self.articles.iter().filter(|a| query.matches(a)).collect();
        matching.sort_by(|a, b| hash.compare(a, b));

        Page {
            total: matching.len() as u64,
            articles: matching
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect(),
        }
    }
}

/// Process-local store, used for tests and `DATABASE_URL=memory`.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
    hash: TiebreakHash,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tiebreak(hash: TiebreakHash) -> Self {
        Self {
            store: Arc::default(),
            hash,
        }
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        Ok(self.store.write().await.insert_if_absent(article))
    }

    async fn update_score(&self, url: &str, result: &ScoreResult) -> Result<bool> {
        Ok(self.store.write().await.update_score(url, result))
    }

    async fn fetch_unscored(&self) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .filter(|a| !a.is_scored())
            .cloned()
            .collect())
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        Ok(self.store.read().await.page(query, &self.hash))
    }

    async fn urls_for_site(&self, site_name: &str) -> Result<HashSet<String>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .filter(|a| a.site_name == site_name)
            .map(|a| a.url.clone())
            .collect())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let store = self.store.read().await;
        Ok(store.articles.iter().find(|a| a.url == url).cloned())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut store = self.store.write().await;
        let before = store.articles.len();
        store.articles.retain(|a| a.created_at >= cutoff);
        Ok((before - store.articles.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_article(site: &str, url: &str) -> NewArticle {
        NewArticle {
            site_name: site.to_string(),
            url: url.to_string(),
            title: format!("Title of {}", url),
            text: "Some body text".to_string(),
            authors: vec!["Jane Doe".to_string()],
            publish_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        }
    }

    async fn seeded(scores: &[i32]) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        for (i, score) in scores.iter().enumerate() {
            let url = format!("https://site.test/{}", i);
            storage
                .insert_if_absent(&new_article("Site", &url))
                .await
                .unwrap();
            if *score != UNSCORED {
                let result = ScoreResult::new(*score as i64, "summary").unwrap();
                storage.update_score(&url, &result).await.unwrap();
            }
        }
        storage
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let storage = InMemoryStorage::new();
        let article = new_article("Site", "https://site.test/a");

        assert!(storage.insert_if_absent(&article).await.unwrap());
        let mut changed = article.clone();
        changed.title = "Another title".to_string();
        assert!(!storage.insert_if_absent(&changed).await.unwrap());

        let stored = storage.get_by_url(&article.url).await.unwrap().unwrap();
        assert_eq!(stored.title, article.title);
        assert_eq!(stored.score, UNSCORED);
        assert_eq!(storage.urls_for_site("Site").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_score_only_once() {
        let storage = seeded(&[UNSCORED]).await;
        let url = "https://site.test/0";

        let first = ScoreResult::new(6, "first").unwrap();
        let second = ScoreResult::new(2, "second").unwrap();
        assert!(storage.update_score(url, &first).await.unwrap());
        assert!(!storage.update_score(url, &second).await.unwrap());

        let stored = storage.get_by_url(url).await.unwrap().unwrap();
        assert_eq!(stored.score, 6);
        assert_eq!(stored.summary.as_deref(), Some("first"));
        assert!(storage.fetch_unscored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ranking_priority() {
        let storage = seeded(&[UNSCORED, 7, 7, 3]).await;
        let page = storage
            .page(&PageQuery::for_sites(["Site"]))
            .await
            .unwrap();

        let scores: Vec<i32> = page.articles.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![7, 7, 3, UNSCORED]);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_custom_tiebreak_constants() {
        async fn order(hash: TiebreakHash) -> Vec<i64> {
            let storage = InMemoryStorage::with_tiebreak(hash);
            for i in 0..4 {
                let url = format!("https://site.test/{}", i);
                storage.insert_if_absent(&new_article("Site", &url)).await.unwrap();
                let result = ScoreResult::new(5, "tie").unwrap();
                storage.update_score(&url, &result).await.unwrap();
            }
            let page = storage.page(&PageQuery::for_sites(["Site"])).await.unwrap();
            page.articles.iter().map(|a| a.id).collect()
        }

        // keys (3 * id + 1) % 8 are 4, 7, 2, 5
        assert_eq!(order(TiebreakHash::new(3, 1, 8).unwrap()).await, vec![3, 1, 4, 2]);
        // keys 3 * id % 2 collide, so id breaks the remaining ties
        assert_eq!(order(TiebreakHash::new(3, 0, 2).unwrap()).await, vec![2, 4, 1, 3]);
    }

    #[tokio::test]
    async fn test_pagination_covers_full_order() {
        let storage = seeded(&[5, 5, 5, 2, UNSCORED, 9, 5]).await;
        let full = storage
            .page(&PageQuery::for_sites(["Site"]).slice(100, 0))
            .await
            .unwrap();

        let mut collected = Vec::new();
        for offset in (0..7).step_by(3) {
            let page = storage
                .page(&PageQuery::for_sites(["Site"]).slice(3, offset))
                .await
                .unwrap();
            assert_eq!(page.total, 7);
            collected.extend(page.articles.into_iter().map(|a| a.id));
        }
        let full_ids: Vec<i64> = full.articles.iter().map(|a| a.id).collect();
        assert_eq!(collected, full_ids);
    }

    #[tokio::test]
    async fn test_min_score_filter_changes_total() {
        let storage = seeded(&[UNSCORED, 6, 2, 9, 6]).await;
        let page = storage
            .page(&PageQuery::for_sites(["Site"]).at_least(Some(6)).slice(2, 0))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        let scores: Vec<i32> = page.articles.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![9, 6]);
    }

    #[tokio::test]
    async fn test_empty_site_set_short_circuits() {
        let storage = seeded(&[1, 2]).await;
        let page = storage
            .page(&PageQuery::for_sites(Vec::<String>::new()))
            .await
            .unwrap();
        assert_eq!(page, Page::default());
    }

    #[tokio::test]
    async fn test_retention_sweep() {
        let storage = seeded(&[UNSCORED, 4]).await;
        let removed = storage
            .delete_created_before(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = storage
            .delete_created_before(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(storage.urls_for_site("Site").await.unwrap().is_empty());
    }
}
