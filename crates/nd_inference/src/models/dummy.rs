use nd_core::{InferenceModel, Result, ScoringRequest, MAX_SCORE};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;

/// Offline scorer: counts how many interest keywords show up in the article.
pub struct DummyModel;

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").finish()
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait::async_trait]
impl InferenceModel for DummyModel {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn complete(&self, request: &ScoringRequest) -> Result<Option<String>> {
        let article = request
            .user
            .split_once("Title: ")
            .map(|(_, rest)| rest)
            .unwrap_or(&request.user);

        let wanted = keywords(&request.interest);
        let present = keywords(article);
        let score = if wanted.is_empty() {
            0
        } else {
            let hits = wanted.intersection(&present).count() as i32;
            (hits * MAX_SCORE / wanted.len() as i32).min(MAX_SCORE)
        };

        // Take first 20 words of title and text
        let summary = article
            .split_whitespace()
            .filter(|w| *w != "Text:")
            .take(20)
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Some(json!({ "summary": summary, "score": score }).to_string()))
    }
}
