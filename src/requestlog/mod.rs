//! Request log and request metrics.

mod store;
mod record;
mod sink;

pub use store::{EndpointCount, RequestLog, RequestStats};
pub use record::RequestLogRecord;
pub use sink::{read_json_lines, JsonLinesSink, RequestLogSink};
