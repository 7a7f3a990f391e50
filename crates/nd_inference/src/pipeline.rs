use std::sync::Arc;

use futures::stream::{self, StreamExt};
use nd_core::{Article, ArticleStorage, Estimate, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::RelevanceClient;

pub const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Scored,
    Ineligible,
    Malformed,
    Failed,
    /// Another run scored the article first.
    Superseded,
}

/// Counts of what happened to each article of one scoring run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub scored: usize,
    pub ineligible: usize,
    pub malformed: usize,
    pub failed: usize,
    pub superseded: usize,
}

impl RunReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Scored => self.scored += 1,
            Outcome::Ineligible => self.ineligible += 1,
            Outcome::Malformed => self.malformed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Superseded => self.superseded += 1,
        }
    }
}

/// Scores every article that is unscored when a run starts.
pub struct ScoringPipeline {
    storage: Arc<dyn ArticleStorage>,
    client: RelevanceClient,
    concurrency: usize,
}

impl ScoringPipeline {
    pub fn new(storage: Arc<dyn ArticleStorage>, client: RelevanceClient) -> Self {
        Self {
            storage,
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// One pass over the unscored snapshot.
    ///
    /// Only a failure to read the snapshot is returned as an error. Every
    /// per-article problem is logged and counted in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let articles = self.storage.fetch_unscored().await?;
        let mut report = RunReport {
            total: articles.len(),
            ..Default::default()
        };
        info!(
            total = report.total,
            model = self.client.model_name(),
            "Starting scoring run"
        );

        let outcomes: Vec<Outcome> = stream::iter(articles)
            .map(|article| async move { self.score_one(&article).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }
        info!(
            total = report.total,
            scored = report.scored,
            ineligible = report.ineligible,
            malformed = report.malformed,
            failed = report.failed,
            superseded = report.superseded,
            "Completed scoring run"
        );
        Ok(report)
    }

    async fn score_one(&self, article: &Article) -> Outcome {
        let result = match self.client.estimate(article).await {
            Ok(Estimate::Scored(result)) => result,
            Ok(Estimate::Ineligible) => {
                debug!(url = %article.url, site = %article.site_name, "No reader preference; skipping");
                return Outcome::Ineligible;
            }
            Ok(Estimate::Malformed(reason)) => {
                warn!(
                    url = %article.url,
                    site = %article.site_name,
                    reason = %reason,
                    "Model returned an unusable answer; will retry next run"
                );
                return Outcome::Malformed;
            }
            Err(e) => {
                error!(url = %article.url, site = %article.site_name, error = %e, "Relevance call failed");
                return Outcome::Failed;
            }
        };

        match self.storage.update_score(&article.url, &result).await {
            Ok(true) => {
                debug!(url = %article.url, score = result.score(), "Stored score");
                Outcome::Scored
            }
            Ok(false) => {
                debug!(url = %article.url, "Article already scored elsewhere");
                Outcome::Superseded
            }
            Err(e) => {
                error!(url = %article.url, site = %article.site_name, error = %e, "Failed to store score");
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiter;
    use async_trait::async_trait;
    use nd_core::{
        Error, InferenceModel, NewArticle, ScoreResult, ScoringRequest, SourcesConfig, UNSCORED,
    };
    use nd_storage::InMemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SOURCES: &str = r#"
categories:
  - name: Tech
    sources:
      - name: Scored Site
        url: https://scored.test
        preference: databases and compilers
      - name: Quiet Site
        url: https://quiet.test
"#;

    /// Fails for articles whose title contains "boom", answers garbage for "junk".
    struct FlakyModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceModel for FlakyModel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &ScoringRequest) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.user.contains("boom") {
                return Err(Error::Inference("upstream timed out".to_string()));
            }
            if request.user.contains("junk") {
                return Ok(Some("I think it's a 7".to_string()));
            }
            Ok(Some(r#"{"summary": "Worth reading.", "score": 6}"#.to_string()))
        }
    }

    async fn setup(titles: &[(&str, &str)]) -> (Arc<InMemoryStorage>, Arc<FlakyModel>, ScoringPipeline) {
        let storage = Arc::new(InMemoryStorage::new());
        for (i, (site, title)) in titles.iter().enumerate() {
            storage
                .insert_if_absent(&NewArticle {
                    site_name: site.to_string(),
                    url: format!("https://{}.test/{}", i, i),
                    title: title.to_string(),
                    text: "Body text".to_string(),
                    authors: vec![],
                    publish_date: None,
                })
                .await
                .unwrap();
        }
        let model = Arc::new(FlakyModel {
            calls: AtomicUsize::new(0),
        });
        let client = RelevanceClient::new(
            Arc::new(SourcesConfig::from_yaml_str(SOURCES).unwrap()),
            model.clone(),
            Arc::new(RateLimiter::with_delay(Duration::from_millis(10))),
        );
        let pipeline = ScoringPipeline::new(storage.clone(), client).with_concurrency(4);
        (storage, model, pipeline)
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn test_run_future_is_send() {
        let (_, _, pipeline) = setup(&[]).await;
        let pipeline = Arc::new(pipeline);
        assert_send(pipeline.run());

        let handle = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run().await }
        });
        assert_eq!(handle.await.unwrap().unwrap(), RunReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failure_does_not_block_others() {
        let (storage, _, pipeline) = setup(&[
            ("Scored Site", "one"),
            ("Scored Site", "two"),
            ("Scored Site", "boom three"),
            ("Scored Site", "four"),
            ("Scored Site", "five"),
        ])
        .await;

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.total, 5);
        assert_eq!(report.scored, 4);
        assert_eq!(report.failed, 1);

        let remaining = storage.fetch_unscored().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "boom three");
        assert!(remaining[0].summary.is_none());

        let scored = storage.get_by_url("https://0.test/0").await.unwrap().unwrap();
        assert_eq!(scored.score, 6);
        assert_eq!(scored.summary.as_deref(), Some("Worth reading."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineligible_articles_are_never_touched() {
        let (storage, model, pipeline) =
            setup(&[("Quiet Site", "ignored"), ("Scored Site", "counted")]).await;

        for _ in 0..3 {
            let report = pipeline.run().await.unwrap();
            assert_eq!(report.ineligible, 1);
        }

        let quiet = storage.get_by_url("https://0.test/0").await.unwrap().unwrap();
        assert_eq!(quiet.score, UNSCORED);
        assert!(quiet.summary.is_none());
        // Only the eligible article reached the model, and only once.
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_answers_are_retried_next_run() {
        let (storage, model, pipeline) = setup(&[("Scored Site", "junk")]).await;

        let first = pipeline.run().await.unwrap();
        let second = pipeline.run().await.unwrap();
        assert_eq!(first.malformed, 1);
        assert_eq!(second.malformed, 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(storage.fetch_unscored().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scored_elsewhere_is_superseded() {
        let (storage, _, pipeline) = setup(&[("Scored Site", "race")]).await;
        let snapshot = storage.fetch_unscored().await.unwrap();
        storage
            .update_score(&snapshot[0].url, &ScoreResult::new(2, "first writer").unwrap())
            .await
            .unwrap();

        let outcome = pipeline.score_one(&snapshot[0]).await;
        assert_eq!(outcome, Outcome::Superseded);
        let stored = storage.get_by_url(&snapshot[0].url).await.unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("first writer"));
    }
}
