//! Shared instances handed to every request handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::cache::{LlmResponseCache, TtlCache};
use crate::config::InsightConfig;
use crate::error::Result;
use crate::ratelimit::{ExcludedPaths, FixedWindowLimiter, ScrapeThrottle, SlidingWindowLimiter};
use crate::requestlog::RequestLog;

/// Process-wide components, constructed once by the server setup.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<FixedWindowLimiter>,
    pub excluded_paths: Arc<ExcludedPaths>,
    pub request_log: Arc<RequestLog>,
    pub cache: Arc<TtlCache<Value>>,
    pub llm_limiter: Arc<SlidingWindowLimiter>,
    pub llm_cache: Arc<LlmResponseCache>,
    pub scrape_throttle: Arc<ScrapeThrottle>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build every component from configuration.
    pub fn from_config(config: &InsightConfig) -> Result<Self> {
        let http = &config.http_rate_limit;
        let rate_limiter =
            FixedWindowLimiter::new(http.max_requests, http.window(), http.sweep_interval())?;

        let request_log = match &config.request_log.path {
            Some(path) => {
                info!(path = %path.display(), "Persisting request log");
                RequestLog::open(path)?
            }
            None => RequestLog::new(),
        };

        let llm = &config.llm_rate_limit;
        let llm_limiter = SlidingWindowLimiter::new(
            llm.requests_per_minute,
            llm.tokens_per_minute,
            llm.window(),
        )?;

        let scraping = &config.scraping;
        let scrape_throttle =
            ScrapeThrottle::new(scraping.requests_per_minute, scraping.min_delay())?;

        Ok(Self {
            rate_limiter: Arc::new(rate_limiter),
            excluded_paths: Arc::new(ExcludedPaths::new(http.excluded_paths.iter().cloned())),
            request_log: Arc::new(request_log),
            cache: Arc::new(TtlCache::new(config.cache.default_ttl(), config.cache.max_entries)?),
            llm_limiter: Arc::new(llm_limiter),
            llm_cache: Arc::new(LlmResponseCache::new(
                config.llm_cache.ttl(),
                config.llm_cache.max_entries,
            )?),
            scrape_throttle: Arc::new(scrape_throttle),
            started_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_components_follow_config() {
        let yaml = r#"
llm_rate_limit:
  requests_per_minute: 7
scraping:
  requests_per_minute: 12
  min_delay_ms: 250
"#;
        let config = InsightConfig::from_yaml(yaml).unwrap();
        let state = AppState::from_config(&config).unwrap();

        let scraping = state.scrape_throttle.stats().await;
        assert_eq!(scraping.requests_per_minute, 12);
        assert_eq!(scraping.min_delay_ms, 250);
        assert_eq!(state.llm_limiter.stats().rpm_limit, 7);
        assert_eq!(state.rate_limiter.max_requests(), 100);
    }
}
