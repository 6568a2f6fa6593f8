//! Rate limiting and request logging middleware.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::state::AppState;
use crate::ratelimit::{RateLimitKey, RateLimitMetadata};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");
const X_API_KEY: &str = "x-api-key";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// JSON body of a 429 response.
#[derive(Debug, Serialize)]
struct RateLimitExceeded {
    error: &'static str,
    message: String,
    retry_after: u64,
}

/// Derive the rate limit key from request headers and the peer address.
pub fn request_key(req: &Request) -> RateLimitKey {
    RateLimitKey::from_parts(
        header_str(req.headers(), X_API_KEY),
        header_str(req.headers(), X_FORWARDED_FOR),
        peer_ip(req),
    )
}

/// Client address as seen through any forwarding proxy.
pub fn client_ip(req: &Request) -> String {
    let key = RateLimitKey::from_parts(
        None,
        header_str(req.headers(), X_FORWARDED_FOR),
        peer_ip(req),
    );
    key.client_ip().unwrap_or("unknown").to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn peer_ip(req: &Request) -> Option<std::net::IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, metadata: &RateLimitMetadata) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(metadata.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(metadata.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(metadata.reset));
}

fn too_many_requests(metadata: &RateLimitMetadata, window_secs: u64) -> Response {
    let retry_after = metadata.retry_after(Utc::now());
    let body = RateLimitExceeded {
        error: "Too Many Requests",
        message: format!(
            "Rate limit exceeded. Max {} requests per {} seconds.",
            metadata.limit, window_secs
        ),
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, metadata);
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Admit or reject a request against the per-client fixed window.
///
/// Excluded paths pass straight through without touching limiter state.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.excluded_paths.is_excluded(req.uri().path()) {
        return next.run(req).await;
    }

    let key = request_key(&req).to_string();
    let decision = state.rate_limiter.is_allowed(&key);

    if !decision.allowed {
        debug!(
            key = %key,
            path = %req.uri().path(),
            reset = decision.metadata.reset,
            "Rejecting request over rate limit"
        );
        return too_many_requests(&decision.metadata, state.rate_limiter.window().as_secs());
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision.metadata);
    response
}

/// Time each request, emit a log line and append it to the request log.
pub async fn log_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req);

    let mut response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    info!(
        method = %method,
        path = %path,
        status,
        elapsed_ms = format_args!("{:.2}", elapsed_ms),
        ip = %ip,
        "Request served"
    );

    if !state.excluded_paths.is_excluded(&path) {
        state.request_log.record(&ip, &path, &method, status, elapsed_ms);
    }

    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}ms", elapsed_ms)) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }
    response
}
