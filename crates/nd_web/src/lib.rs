use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/categories/:category/sites", get(handlers::list_category_sites))
        .route("/api/categories/:category/articles", get(handlers::list_category_articles))
        .route("/api/sites/:site/articles", get(handlers::list_site_articles))
        .route("/api/articles", get(handlers::list_articles))
        .route("/api/today", get(handlers::list_today_articles))
        .route(
            "/api/today/minscore/:min_score",
            get(handlers::list_today_articles_min_score),
        )
        .route("/api/jobs/scrape", post(handlers::run_scrape))
        .route("/api/jobs/score", post(handlers::run_score))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use crate::{create_app, AppState};
    pub use nd_core::{Article, Error, Result};
}
