use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use reddit_insight::config::InsightConfig;
use reddit_insight::http::{router, AppState};

fn state_with_limit(max_requests: u64) -> AppState {
    let yaml = format!(
        r#"
http_rate_limit:
  max_requests: {}
  window_secs: 60
"#,
        max_requests
    );
    let config = InsightConfig::from_yaml(&yaml).unwrap();
    AppState::from_config(&config).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str, ip: &str) -> Response {
    send(app, Method::GET, uri, &[("X-Forwarded-For", ip)]).await
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_allowed_requests_carry_rate_limit_headers() {
    let app = router(state_with_limit(3));

    for expected_remaining in ["2", "1", "0"] {
        let response = get(&app, "/api/stats/cache", "10.0.0.1").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("3"));
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some(expected_remaining));
        assert!(header(&response, "x-ratelimit-reset").is_some());
        assert!(header(&response, "x-process-time").unwrap().ends_with("ms"));
    }
}

#[tokio::test]
async fn test_exhausted_client_gets_429() {
    let app = router(state_with_limit(3));

    for _ in 0..3 {
        get(&app, "/api/stats/cache", "10.0.0.1").await;
    }
    let response = get(&app, "/api/stats/cache", "10.0.0.1").await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-limit"), Some("3"));
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("0"));
    assert!(header(&response, "x-ratelimit-reset").is_some());

    let retry_header: u64 = header(&response, "retry-after").unwrap().parse().unwrap();
    assert!(retry_header <= 60);

    let body = json_body(response).await;
    assert_eq!(body["error"], "Too Many Requests");
    assert_eq!(body["message"], "Rate limit exceeded. Max 3 requests per 60 seconds.");
    assert!(body["retry_after"].as_u64().unwrap() <= 60);

    // Other clients are unaffected.
    let other = get(&app, "/api/stats/cache", "10.0.0.2").await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_keys_are_limited_independently() {
    let app = router(state_with_limit(1));
    let key_a = [("X-API-Key", "key-aaaaaaaaaaaaaaaa"), ("X-Forwarded-For", "10.0.0.1")];
    let key_b = [("X-API-Key", "key-bbbbbbbbbbbbbbbb"), ("X-Forwarded-For", "10.0.0.1")];

    let first = send(&app, Method::GET, "/api/stats/cache", &key_a).await;
    let second = send(&app, Method::GET, "/api/stats/cache", &key_a).await;
    let other = send(&app, Method::GET, "/api/stats/cache", &key_b).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_excluded_paths_bypass_limits_and_log() {
    let state = state_with_limit(1);
    let app = router(state.clone());

    for _ in 0..5 {
        let response = get(&app, "/health", "10.0.0.1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "x-ratelimit-limit").is_none());
        assert!(header(&response, "x-process-time").is_some());
    }

    assert!(state.request_log.is_empty());
    assert_eq!(state.rate_limiter.stats().total_tracked, 0);

    let body = json_body(get(&app, "/health", "10.0.0.1").await).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_rejected_requests_are_logged() {
    let state = state_with_limit(2);
    let app = router(state.clone());

    for _ in 0..3 {
        get(&app, "/api/stats/cache", "10.0.0.1").await;
    }

    let stats = json_body(get(&app, "/api/stats/requests?hours=1", "10.0.0.2").await).await;
    assert_eq!(stats["total_requests"], 3);
    assert_eq!(stats["status_codes"]["200"], 2);
    assert_eq!(stats["status_codes"]["429"], 1);
    assert_eq!(stats["top_endpoints"][0]["endpoint"], "/api/stats/cache");

    let errors = json_body(get(&app, "/api/stats/errors?limit=10", "10.0.0.3").await).await;
    let errors = errors.as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["status_code"], 429);
    assert_eq!(errors[0]["ip"], "10.0.0.1");
}

#[tokio::test]
async fn test_rate_limit_stats_endpoint() {
    let app = router(state_with_limit(5));

    get(&app, "/api/stats/cache", "10.0.0.1").await;
    let body = json_body(get(&app, "/api/stats/rate-limit", "10.0.0.2").await).await;

    assert_eq!(body["http"]["total_tracked"], 2);
    assert_eq!(body["http"]["max_requests"], 5);
    assert_eq!(body["http"]["window_secs"], 60);
    assert_eq!(body["llm"]["rpm_limit"], 60);
    assert_eq!(body["llm"]["current_rpm"], 0);
    assert_eq!(body["scraping"]["requests_per_minute"], 30);
    assert_eq!(body["scraping"]["min_delay_ms"], 1000);
    assert_eq!(body["scraping"]["requests_in_window"], 0);
}

#[tokio::test]
async fn test_request_stats_accepts_largest_period() {
    let app = router(state_with_limit(10));

    get(&app, "/api/stats/cache", "10.0.0.1").await;
    let response = get(&app, "/api/stats/requests?hours=4294967295", "10.0.0.1").await;

    assert_eq!(response.status(), StatusCode::OK);
    let stats = json_body(response).await;
    assert_eq!(stats["period_hours"], 4294967295u64);
    assert_eq!(stats["total_requests"], 1);
}

#[tokio::test]
async fn test_clear_cache_by_pattern() {
    let state = state_with_limit(10);
    state.cache.set("analysis:a", json!({"score": 1}), None);
    state.cache.set("analysis:b", json!({"score": 2}), None);
    state.cache.set("prediction:rust:7", json!([1, 2, 3]), None);
    let app = router(state.clone());

    let response = send(
        &app,
        Method::DELETE,
        "/api/cache?pattern=analysis:*",
        &[("X-Forwarded-For", "10.0.0.1")],
    )
    .await;
    let body = json_body(response).await;

    assert_eq!(body["removed"], 2);
    assert_eq!(state.cache.len(), 1);
    assert!(state.cache.get("prediction:rust:7").is_some());

    let body = json_body(get(&app, "/api/stats/cache", "10.0.0.1").await).await;
    assert_eq!(body["dashboard"]["active"], 1);
}
