//! LLM client with response caching and API rate limiting.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::backend::LlmBackend;
use crate::cache::LlmResponseCache;
use crate::error::Result;
use crate::ratelimit::SlidingWindowLimiter;

/// Wraps an [`LlmBackend`] with a response cache and a shared limiter.
pub struct LlmClient<B: LlmBackend> {
    backend: B,
    rate_limiter: Option<Arc<SlidingWindowLimiter>>,
    cache: Option<Arc<LlmResponseCache>>,
}

impl<B: LlmBackend> LlmClient<B> {
    /// Create a client that calls `backend` directly.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            rate_limiter: None,
            cache: None,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn with_cache(mut self, cache: Arc<LlmResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Complete `prompt`, serving from the cache when allowed.
    ///
    /// Cache hits do not consume rate limit capacity. On a miss the call
    /// waits for capacity covering the prompt plus `max_tokens` of output.
    #[instrument(
        skip(self, prompt),
        fields(model = %self.backend.model(), prompt_chars = prompt.len())
    )]
    pub async fn complete(&self, prompt: &str, max_tokens: u64, use_cache: bool) -> Result<String> {
        let model = self.backend.model();

        if use_cache {
            if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(prompt, model)) {
                debug!("Returning cached LLM response");
                return Ok(cached);
            }
        }

        if let Some(limiter) = &self.rate_limiter {
            let estimated = SlidingWindowLimiter::estimate_tokens(prompt) + max_tokens;
            limiter.acquire(estimated).await;
        }

        let response = self.backend.complete(prompt, max_tokens).await?;

        if use_cache {
            if let Some(cache) = &self.cache {
                cache.set(prompt, model, response.clone());
            }
        }

        Ok(response)
    }
}
