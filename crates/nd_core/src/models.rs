use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fully rendered scoring prompt plus the JSON schema the answer must follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub system: String,
    pub user: String,
    /// Reader interest text the prompt was built from
    pub interest: String,
    pub language: String,
    pub schema: serde_json::Value,
}

#[async_trait]
pub trait InferenceModel: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &str;

    /// Send one scoring request and return the raw response content.
    ///
    /// `Ok(None)` means the service answered without any content. Transport
    /// problems and non-success statuses are errors.
    async fn complete(&self, request: &ScoringRequest) -> crate::Result<Option<String>>;
}
