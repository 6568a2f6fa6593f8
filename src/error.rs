//! Error types for the Reddit Insight core.

use thiserror::Error;

/// Main error type for Reddit Insight operations.
///
/// Capacity exhaustion is not represented here: limiters report it as a
/// normal outcome (a denied decision or a suspended `acquire`).
#[derive(Error, Debug)]
pub enum InsightError {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A component was constructed with an unusable value
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// Failure reported by an external backend (LLM vendor, scraper)
    #[error("Backend error: {0}")]
    Backend(String),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InsightError {
    pub(crate) fn must_be_positive(field: &'static str) -> Self {
        InsightError::InvalidConfig {
            field,
            reason: "must be greater than zero",
        }
    }
}

impl From<config::ConfigError> for InsightError {
    fn from(err: config::ConfigError) -> Self {
        InsightError::Config(err.to_string())
    }
}

/// Result type alias for Reddit Insight operations.
pub type Result<T> = std::result::Result<T, InsightError>;
