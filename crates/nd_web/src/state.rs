use std::sync::Arc;

use nd_core::{ArticleStorage, SourcesConfig};
use nd_inference::ScoringPipeline;
use nd_scrappers::IngestManager;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ArticleStorage>,
    pub sources: Arc<SourcesConfig>,
    pub pipeline: Arc<ScoringPipeline>,
    pub ingest: Arc<IngestManager>,
}
