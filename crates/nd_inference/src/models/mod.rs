use std::sync::Arc;
use std::time::Duration;

use nd_core::{Error, InferenceModel, Result};
use tracing::info;

pub mod dummy;
pub mod openai;

pub use dummy::DummyModel;
pub use openai::OpenAiModel;

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// `openai` or `dummy`
    pub backend: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            api_base: None,
            api_key: None,
            model: None,
            timeout: Duration::from_secs(120),
        }
    }
}

pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn InferenceModel>> {
    let model: Arc<dyn InferenceModel> = match config.backend.to_lowercase().as_str() {
        "openai" => {
            let base = config.api_base.as_deref().ok_or_else(|| openai::missing("OPENAI_API_BASE"))?;
            let key = config.api_key.as_deref().ok_or_else(|| openai::missing("OPENAI_API_KEY"))?;
            let model = config.model.as_deref().ok_or_else(|| openai::missing("OPENAI_MODEL"))?;
            Arc::new(OpenAiModel::new(base, key, model, config.timeout)?)
        }
        "dummy" => Arc::new(DummyModel),
        other => {
            return Err(Error::Config(format!("Unknown model backend: {}", other)));
        }
    };
    info!("Inference model ready: {}", model.name());
    Ok(model)
}
