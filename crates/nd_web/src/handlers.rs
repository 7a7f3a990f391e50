use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use nd_core::{Article, PageQuery, MAX_SCORE};
use nd_inference::RunReport;
use nd_scrappers::IngestReport;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_score: Option<i32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub articles: Vec<Article>,
}

impl PageParams {
    fn into_query(self, sites: Vec<String>) -> Result<PageQuery, ApiError> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since >= until {
                return Err(ApiError::BadRequest(
                    "`since` must be earlier than `until`".to_string(),
                ));
            }
        }
        if let Some(min) = self.min_score {
            if !(0..=MAX_SCORE).contains(&min) {
                return Err(ApiError::BadRequest(format!(
                    "`min_score` must be between 0 and {}",
                    MAX_SCORE
                )));
            }
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok(PageQuery::for_sites(sites)
            .window(self.since, self.until)
            .at_least(self.min_score)
            .slice(limit, self.offset.unwrap_or(0)))
    }
}

async fn ranked_page(state: &AppState, query: PageQuery) -> ApiResult<PageResponse> {
    let page = state.storage.page(&query).await?;
    Ok(Json(PageResponse {
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        articles: page.articles,
    }))
}

fn category_sites(state: &AppState, category: &str) -> Result<Vec<String>, ApiError> {
    state
        .sources
        .sites_in_category(category)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown category: {}", category)))
}

pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(
        state
            .sources
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}

pub async fn list_category_sites(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> ApiResult<Vec<String>> {
    category_sites(&state, &category).map(Json)
}

pub async fn list_category_articles(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<PageResponse> {
    let sites = category_sites(&state, &category)?;
    let query = params.into_query(sites)?;
    ranked_page(&state, query).await
}

pub async fn list_site_articles(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<PageResponse> {
    let source = state
        .sources
        .source(&site)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown site: {}", site)))?;
    let query = params.into_query(vec![source.name.clone()])?;
    ranked_page(&state, query).await
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> ApiResult<PageResponse> {
    let query = params.into_query(state.sources.all_site_names())?;
    ranked_page(&state, query).await
}

/// Everything published since midnight UTC, across all sites.
///
/// A caller's `since` can only narrow the window further; `until` is kept.
pub async fn list_today_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> ApiResult<PageResponse> {
    today_page(&state, params).await
}

/// Today's articles scored at least `min_score`.
pub async fn list_today_articles_min_score(
    State(state): State<Arc<AppState>>,
    Path(min_score): Path<i32>,
    Query(params): Query<PageParams>,
) -> ApiResult<PageResponse> {
    let params = PageParams {
        min_score: Some(min_score),
        ..params
    };
    today_page(&state, params).await
}

async fn today_page(state: &AppState, params: PageParams) -> ApiResult<PageResponse> {
    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc());
    let params = PageParams {
        since: params.since.max(midnight),
        ..params
    };
    let query = params.into_query(state.sources.all_site_names())?;
    ranked_page(state, query).await
}

pub async fn run_scrape(State(state): State<Arc<AppState>>) -> Json<IngestReport> {
    Json(state.ingest.ingest_all().await)
}

pub async fn run_score(State(state): State<Arc<AppState>>) -> ApiResult<RunReport> {
    Ok(Json(state.pipeline.run().await?))
}
