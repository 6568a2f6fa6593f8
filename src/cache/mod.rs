//! In-process caches.

mod llm;
mod ttl;
pub mod keys;

pub use llm::{LlmCacheStats, LlmResponseCache};
pub use ttl::{CacheEntry, CacheStats, TtlCache};
