//! LLM response cache keyed by prompt and model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::ttl::TtlCache;
use crate::clock::{self, SharedClock};
use crate::error::Result;

/// Hit/miss counters for the LLM response cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate_percent: f64,
}

/// Caches LLM completions so identical prompts are not re-sent.
pub struct LlmResponseCache {
    inner: TtlCache<String>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LlmResponseCache {
    pub fn new(ttl: Duration, max_size: usize) -> Result<Self> {
        Self::with_clock(ttl, max_size, clock::system())
    }

    pub fn with_clock(ttl: Duration, max_size: usize, clock: SharedClock) -> Result<Self> {
        Ok(Self {
            inner: TtlCache::with_clock(ttl, max_size, clock)?,
            max_size,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Hex SHA-256 of `model:prompt`.
    pub fn cache_key(prompt: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b":");
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, prompt: &str, model: &str) -> Option<String> {
        let key = Self::cache_key(prompt, model);
        match self.inner.get(&key) {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %&key[..16], "LLM cache hit");
                Some(response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, prompt: &str, model: &str, response: impl Into<String>) {
        let key = Self::cache_key(prompt, model);
        debug!(key = %&key[..16], "Caching LLM response");
        self.inner.set(key, response.into(), None);
    }

    /// Drop the cached response for one prompt. Returns whether it existed.
    pub fn invalidate(&self, prompt: &str, model: &str) -> bool {
        self.inner.delete(&Self::cache_key(prompt, model))
    }

    pub fn clear(&self) -> usize {
        self.inner.clear()
    }

    pub fn stats(&self) -> LlmCacheStats {
        self.inner.cleanup();

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        LlmCacheStats {
            size: self.inner.len(),
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs(),
            total_hits: hits,
            total_misses: misses,
            hit_rate_percent: hit_rate,
        }
    }
}
