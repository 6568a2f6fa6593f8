//! A single logged request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One served request. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub id: u64,
    pub ip: String,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub created_at: DateTime<Utc>,
}

impl RequestLogRecord {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
