//! Configuration management for Reddit Insight.
//!
//! Every limit and window is an operator-visible value. Configuration is read
//! from an optional YAML file and then overridden by environment variables of
//! the form `REDDIT_INSIGHT__<SECTION>__<FIELD>`, e.g.
//! `REDDIT_INSIGHT__HTTP_RATE_LIMIT__MAX_REQUESTS=200`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{InsightError, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "REDDIT_INSIGHT";

/// Main configuration for the Reddit Insight core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-client HTTP rate limiting
    #[serde(default)]
    pub http_rate_limit: HttpRateLimitConfig,

    /// Dashboard result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// LLM API rate limiting
    #[serde(default)]
    pub llm_rate_limit: LlmRateLimitConfig,

    /// LLM response cache
    #[serde(default)]
    pub llm_cache: LlmCacheConfig,

    /// Reddit scraping throttle
    #[serde(default)]
    pub scraping: ScrapingConfig,

    /// Request log persistence
    #[serde(default)]
    pub request_log: RequestLogConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Dashboard HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Fixed-window HTTP rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRateLimitConfig {
    /// Requests allowed per client per window
    #[serde(default = "default_http_max_requests")]
    pub max_requests: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often stale client entries are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Path prefixes that bypass rate limiting and request logging
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

impl Default for HttpRateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_http_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
            excluded_paths: default_excluded_paths(),
        }
    }
}

impl HttpRateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_http_max_requests() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_excluded_paths() -> Vec<String> {
    ["/health", "/static", "/favicon.ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Dashboard cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one, in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// Maximum number of cached entries
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_entries() -> usize {
    1000
}

/// LLM API rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRateLimitConfig {
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u64,

    #[serde(default = "default_tpm")]
    pub tokens_per_minute: u64,

    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for LlmRateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            tokens_per_minute: default_tpm(),
            window_secs: default_window_secs(),
        }
    }
}

impl LlmRateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_rpm() -> u64 {
    60
}

fn default_tpm() -> u64 {
    100_000
}

/// LLM response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCacheConfig {
    #[serde(default = "default_llm_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

impl Default for LlmCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_llm_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl LlmCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_llm_cache_ttl() -> u64 {
    86_400
}

/// Reddit scraping throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    #[serde(default = "default_scrape_rpm")]
    pub requests_per_minute: u64,

    /// Minimum delay between consecutive requests, in milliseconds
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_scrape_rpm(),
            min_delay_ms: default_min_delay(),
        }
    }
}

impl ScrapingConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

fn default_scrape_rpm() -> u64 {
    30
}

fn default_min_delay() -> u64 {
    1000
}

/// Request log persistence configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestLogConfig {
    /// JSON-lines file that records are appended to; in-memory only if unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl InsightConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: InsightConfig =
            serde_yaml::from_str(yaml).map_err(|e| InsightError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: InsightConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("http_rate_limit.excluded_paths")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject zero limits and windows.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, bool); 11] = [
            ("http_rate_limit.max_requests", self.http_rate_limit.max_requests > 0),
            ("http_rate_limit.window_secs", self.http_rate_limit.window_secs > 0),
            ("http_rate_limit.sweep_interval_secs", self.http_rate_limit.sweep_interval_secs > 0),
            ("cache.default_ttl_secs", self.cache.default_ttl_secs > 0),
            ("cache.max_entries", self.cache.max_entries > 0),
            ("llm_rate_limit.requests_per_minute", self.llm_rate_limit.requests_per_minute > 0),
            ("llm_rate_limit.tokens_per_minute", self.llm_rate_limit.tokens_per_minute > 0),
            ("llm_rate_limit.window_secs", self.llm_rate_limit.window_secs > 0),
            ("llm_cache.ttl_secs", self.llm_cache.ttl_secs > 0),
            ("llm_cache.max_entries", self.llm_cache.max_entries > 0),
            ("scraping.requests_per_minute", self.scraping.requests_per_minute > 0),
        ];

        match checks.iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(InsightError::must_be_positive(*field)),
            None => Ok(()),
        }
    }
}
