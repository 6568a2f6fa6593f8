//! LLM backend trait for abstracting vendor clients.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for LLM completion backends.
///
/// The throttled [`LlmClient`](super::LlmClient) works with any vendor
/// implementation; the vendor HTTP clients live outside this crate.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, part of the response cache key.
    fn model(&self) -> &str;

    /// Generate a completion for `prompt` of at most `max_tokens` tokens.
    async fn complete(&self, prompt: &str, max_tokens: u64) -> Result<String>;
}
