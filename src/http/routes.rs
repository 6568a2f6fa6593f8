//! Dashboard monitoring routes.

use axum::{
    extract::{Query, State},
    middleware,
    response::Json,
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tracing::info;

use super::middleware::{log_requests, rate_limit};
use super::state::AppState;
use crate::cache::{CacheStats, LlmCacheStats};
use crate::ratelimit::{FixedWindowStats, ScrapeThrottleStats, SlidingWindowStats};
use crate::requestlog::{RequestLogRecord, RequestStats};

const DEFAULT_STATS_HOURS: u32 = 24;
const DEFAULT_ERROR_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStatsResponse {
    pub http: FixedWindowStats,
    pub llm: SlidingWindowStats,
    pub scraping: ScrapeThrottleStats,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub dashboard: CacheStats,
    pub llm: LlmCacheStats,
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub pattern: Option<String>,
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheQuery {
    pub pattern: Option<String>,
}

/// Build the dashboard router.
///
/// Request logging wraps rate limiting, so rejected requests are logged too.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats/requests", get(request_stats))
        .route("/api/stats/errors", get(error_logs))
        .route("/api/stats/rate-limit", get(rate_limit_stats))
        .route("/api/stats/cache", get(cache_stats))
        .route("/api/cache", delete(clear_cache))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(state.clone(), log_requests))
                .layer(middleware::from_fn_with_state(state.clone(), rate_limit)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy",
        timestamp: now,
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}

async fn request_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<RequestStats> {
    let hours = query.hours.unwrap_or(DEFAULT_STATS_HOURS);
    Json(state.request_log.request_stats(hours))
}

async fn error_logs(
    State(state): State<AppState>,
    Query(query): Query<ErrorsQuery>,
) -> Json<Vec<RequestLogRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_ERROR_LIMIT);
    Json(state.request_log.error_logs(limit))
}

async fn rate_limit_stats(State(state): State<AppState>) -> Json<RateLimitStatsResponse> {
    Json(RateLimitStatsResponse {
        http: state.rate_limiter.stats(),
        llm: state.llm_limiter.stats(),
        scraping: state.scrape_throttle.stats().await,
    })
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        dashboard: state.cache.stats(),
        llm: state.llm_cache.stats(),
    })
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<ClearCacheQuery>,
) -> Json<CacheClearResponse> {
    let removed = match query.pattern.as_deref() {
        Some(pattern) => state.cache.delete_pattern(pattern),
        None => state.cache.clear(),
    };
    info!(pattern = ?query.pattern, removed, "Cleared dashboard cache");

    Json(CacheClearResponse {
        pattern: query.pattern,
        removed,
    })
}
