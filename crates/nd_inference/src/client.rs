use std::fmt;
use std::sync::Arc;

use nd_core::{Article, Estimate, InferenceModel, Result, ScoreResult, SourceCatalog};
use serde::Deserialize;
use tracing::debug;

use crate::prompt::build_request;
use crate::rate_limiter::RateLimiter;

#[derive(Deserialize)]
struct RawScore {
    summary: String,
    score: i64,
}

/// Turn the model's raw answer into an [`Estimate`].
pub fn parse_response(content: Option<&str>) -> Estimate {
    let Some(raw) = content.map(str::trim).filter(|c| !c.is_empty()) else {
        return Estimate::Malformed("empty response".to_string());
    };
    let parsed: RawScore = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => return Estimate::Malformed(format!("invalid JSON: {}", e)),
    };
    match ScoreResult::new(parsed.score, parsed.summary) {
        Some(result) => Estimate::Scored(result),
        None => Estimate::Malformed(format!("score {} out of range", parsed.score)),
    }
}

/// Scores one article against its site's reader preference.
#[derive(Clone)]
pub struct RelevanceClient {
    catalog: Arc<dyn SourceCatalog>,
    model: Arc<dyn InferenceModel>,
    limiter: Arc<RateLimiter>,
}

impl fmt::Debug for RelevanceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelevanceClient")
            .field("model", &self.model.name())
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl RelevanceClient {
    pub fn new(
        catalog: Arc<dyn SourceCatalog>,
        model: Arc<dyn InferenceModel>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            catalog,
            model,
            limiter,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Ask the model about one article.
    ///
    /// Ineligible articles return without touching the rate limiter. Errors
    /// are transport failures only; anything the model says that cannot be
    /// used comes back as [`Estimate::Malformed`].
    pub async fn estimate(&self, article: &Article) -> Result<Estimate> {
        let Some(request) = build_request(self.catalog.as_ref(), article) else {
            return Ok(Estimate::Ineligible);
        };

        self.limiter.acquire().await;
        debug!(url = %article.url, model = self.model.name(), "requesting relevance score");
        let content = self.model.complete(&request).await?;

        Ok(parse_response(content.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use nd_core::{Error, ScoringRequest, SourcesConfig, UNSCORED};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedModel {
        answer: Option<String>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &ScoringRequest) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Inference("connection reset".to_string()));
            }
            Ok(self.answer.clone())
        }
    }

    fn client(answer: Option<&str>, fail: bool) -> (RelevanceClient, Arc<ScriptedModel>) {
        let catalog = SourcesConfig::from_yaml_str(
            "categories:\n  - name: Tech\n    sources:\n      - name: Blog\n        url: https://blog.test\n        preference: Rust\n      - name: Other\n        url: https://other.test\n",
        )
        .unwrap();
        let model = Arc::new(ScriptedModel {
            answer: answer.map(str::to_string),
            fail,
            calls: AtomicUsize::new(0),
        });
        let client = RelevanceClient::new(
            Arc::new(catalog),
            model.clone(),
            Arc::new(RateLimiter::with_delay(Duration::from_millis(1))),
        );
        (client, model)
    }

    fn article(site: &str) -> Article {
        Article {
            id: 1,
            site_name: site.to_string(),
            url: "https://blog.test/post".to_string(),
            title: "Async traits stabilised".to_string(),
            text: "Body".to_string(),
            authors: vec![],
            publish_date: None,
            score: UNSCORED,
            summary: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_response_variants() {
        assert_eq!(
            parse_response(Some(r#"{"summary": "Short.", "score": 4}"#)),
            Estimate::Scored(ScoreResult::new(4, "Short.").unwrap())
        );
        assert!(matches!(parse_response(None), Estimate::Malformed(_)));
        assert!(matches!(parse_response(Some("  ")), Estimate::Malformed(_)));
        assert!(matches!(parse_response(Some("not json")), Estimate::Malformed(_)));
        assert!(matches!(
            parse_response(Some(r#"{"summary": "x"}"#)),
            Estimate::Malformed(_)
        ));
        assert!(matches!(
            parse_response(Some(r#"{"summary": "x", "score": "high"}"#)),
            Estimate::Malformed(_)
        ));
        assert!(matches!(
            parse_response(Some(r#"{"summary": "x", "score": 12}"#)),
            Estimate::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_ineligible_skips_model() {
        let (client, model) = client(Some(r#"{"summary": "x", "score": 1}"#), false);
        let estimate = client.estimate(&article("Other")).await.unwrap();
        assert_eq!(estimate, Estimate::Ineligible);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scored_and_transport_error() {
        let (ok_client, _) = client(Some(r#"{"summary": "Useful.", "score": 8}"#), false);
        match ok_client.estimate(&article("blog")).await.unwrap() {
            Estimate::Scored(result) => {
                assert_eq!(result.score(), 8);
                assert_eq!(result.summary(), "Useful.");
            }
            other => panic!("unexpected estimate: {:?}", other),
        }

        let (failing, model) = client(None, true);
        assert!(failing.estimate(&article("Blog")).await.is_err());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
