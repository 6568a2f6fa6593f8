//! Rate-limited, cached access to LLM backends.

mod backend;
mod client;

pub use backend::LlmBackend;
pub use client::LlmClient;
