//! Reddit Insight - admission control and caching core
//!
//! This crate holds the rate limiting, caching and request logging pieces
//! shared by the Reddit Insight dashboard, its LLM client and its scraper.
//! A sliding-window limiter paces outbound LLM calls by requests and tokens,
//! a fixed-window limiter guards the HTTP API per client, and a TTL cache
//! keeps expensive analysis results around.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod ratelimit;
pub mod requestlog;
