//! Append-only request log with rate and latency queries.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{trace, warn};

use super::record::RequestLogRecord;
use super::sink::{read_json_lines, JsonLinesSink, RequestLogSink};
use crate::clock::{self, SharedClock};
use crate::error::Result;

/// Endpoints listed in [`RequestStats::top_endpoints`].
const TOP_ENDPOINTS: usize = 10;

/// Request volume for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: usize,
}

/// Aggregates over the requests of a recent period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStats {
    pub period_hours: u32,
    pub total_requests: usize,
    pub status_codes: BTreeMap<u16, usize>,
    pub avg_response_time_ms: f64,
    pub top_endpoints: Vec<EndpointCount>,
}

/// Records every served request for later auditing.
///
/// Recording never fails: if the persistence sink rejects a record, the
/// error is logged and the record is still kept in memory.
pub struct RequestLog {
    records: RwLock<Vec<RequestLogRecord>>,
    next_id: AtomicU64,
    sink: Option<Box<dyn RequestLogSink>>,
    clock: SharedClock,
}

impl RequestLog {
    /// An in-memory log.
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), None, clock::system())
    }

    /// A log that also writes every record to `sink`.
    pub fn with_sink(sink: Box<dyn RequestLogSink>) -> Self {
        Self::from_parts(Vec::new(), Some(sink), clock::system())
    }

    pub fn with_clock(sink: Option<Box<dyn RequestLogSink>>, clock: SharedClock) -> Self {
        Self::from_parts(Vec::new(), sink, clock)
    }

    /// Rebuild a read-only view from a JSON-lines file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records = read_json_lines(path)?;
        Ok(Self::from_parts(records, None, clock::system()))
    }

    /// Resume the log persisted at `path`, appending new records to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let records = if path.exists() {
            read_json_lines(path)?
        } else {
            Vec::new()
        };
        let sink = JsonLinesSink::open(path)?;
        Ok(Self::from_parts(records, Some(Box::new(sink)), clock::system()))
    }

    fn from_parts(
        records: Vec<RequestLogRecord>,
        sink: Option<Box<dyn RequestLogSink>>,
        clock: SharedClock,
    ) -> Self {
        let next_id = records.iter().map(|r| r.id + 1).max().unwrap_or(1);
        Self {
            records: RwLock::new(records),
            next_id: AtomicU64::new(next_id),
            sink,
            clock,
        }
    }

    /// Append a record stamped with the current time.
    pub fn record(
        &self,
        ip: &str,
        endpoint: &str,
        method: &str,
        status_code: u16,
        response_time_ms: f64,
    ) {
        let record = RequestLogRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            status_code,
            response_time_ms,
            created_at: self.clock.now(),
        };

        // Persist under the write lock so the sink sees records in id order.
        let mut records = self.records.write();
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(&record) {
                warn!(error = %e, endpoint = %endpoint, "Failed to save request log");
            }
        }
        trace!(id = record.id, endpoint = %endpoint, status_code, "Recorded request");
        records.push(record);
    }

    /// Totals for requests recorded within the last `hours`.
    pub fn request_stats(&self, hours: u32) -> RequestStats {
        let since = self
            .clock
            .now()
            .checked_sub_signed(TimeDelta::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let records = self.records.read();
        let recent: Vec<&RequestLogRecord> =
            records.iter().filter(|r| r.created_at >= since).collect();

        let mut status_codes = BTreeMap::new();
        let mut per_endpoint: HashMap<&str, usize> = HashMap::new();
        let mut total_time = 0.0;

        for record in &recent {
            *status_codes.entry(record.status_code).or_insert(0) += 1;
            *per_endpoint.entry(record.endpoint.as_str()).or_insert(0) += 1;
            total_time += record.response_time_ms;
        }

        let avg_response_time_ms = if recent.is_empty() {
            0.0
        } else {
            (total_time / recent.len() as f64 * 100.0).round() / 100.0
        };

        let mut top_endpoints: Vec<EndpointCount> = per_endpoint
            .into_iter()
            .map(|(endpoint, count)| EndpointCount {
                endpoint: endpoint.to_string(),
                count,
            })
            .collect();
        top_endpoints.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });
        top_endpoints.truncate(TOP_ENDPOINTS);

        RequestStats {
            period_hours: hours,
            total_requests: recent.len(),
            status_codes,
            avg_response_time_ms,
            top_endpoints,
        }
    }

    /// The most recent failed (status >= 400) requests, newest first.
    pub fn error_logs(&self, limit: usize) -> Vec<RequestLogRecord> {
        let records = self.records.read();
        let mut errors: Vec<RequestLogRecord> =
            records.iter().filter(|r| r.is_error()).cloned().collect();
        errors.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        errors.truncate(limit);
        errors
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}
