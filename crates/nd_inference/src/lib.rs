pub mod client;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod rate_limiter;

pub use client::RelevanceClient;
pub use models::{create_model, ModelConfig};
pub use pipeline::{RunReport, ScoringPipeline};
pub use rate_limiter::RateLimiter;

pub mod prelude {
    pub use super::models::create_model;
    pub use super::{ModelConfig, RateLimiter, RelevanceClient, RunReport, ScoringPipeline};
    pub use nd_core::{Article, Estimate, Result, Error};
}
