pub mod config;
pub mod error;
pub mod models;
pub mod ranking;
pub mod storage;
pub mod types;

pub use config::{Category, SourceCatalog, SourceSpec, SourcesConfig};
pub use error::{Error, Result};
pub use models::{InferenceModel, ScoringRequest};
pub use ranking::TiebreakHash;
pub use storage::ArticleStorage;
pub use types::{
    Article, Estimate, NewArticle, Page, PageQuery, Preference, ScoreResult, MAX_SCORE, UNSCORED,
};
