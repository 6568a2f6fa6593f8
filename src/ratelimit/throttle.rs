//! Pacing for Reddit scraping requests.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{InsightError, Result};

const WINDOW: Duration = Duration::from_secs(60);

/// Current usage of a scrape throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeThrottleStats {
    pub requests_in_window: u64,
    pub requests_per_minute: u64,
    pub min_delay_ms: u64,
}

#[derive(Debug)]
struct ThrottleState {
    window_start: Instant,
    request_count: u64,
    last_request: Option<Instant>,
}

impl ThrottleState {
    fn fresh() -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            last_request: None,
        }
    }
}

/// Spaces scraping requests by a minimum delay and caps them per minute.
///
/// Unlike [`SlidingWindowLimiter`](super::SlidingWindowLimiter) the minute
/// is a fixed window: once it is full, callers wait for it to end and a new
/// window starts.
pub struct ScrapeThrottle {
    requests_per_minute: u64,
    min_delay: Duration,
    state: Mutex<ThrottleState>,
}

impl ScrapeThrottle {
    pub fn new(requests_per_minute: u64, min_delay: Duration) -> Result<Self> {
        if requests_per_minute == 0 {
            return Err(InsightError::must_be_positive("requests_per_minute"));
        }

        Ok(Self {
            requests_per_minute,
            min_delay,
            state: Mutex::new(ThrottleState::fresh()),
        })
    }

    /// Suspend until the next request may be sent, then record it.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request {
            let since_last = last.elapsed();
            if since_last < self.min_delay {
                let pause = self.min_delay - since_last;
                debug!(pause_ms = pause.as_millis() as u64, "Enforcing minimum request spacing");
                tokio::time::sleep(pause).await;
            }
        }

        let window_elapsed = state.window_start.elapsed();
        if window_elapsed >= WINDOW {
            state.window_start = Instant::now();
            state.request_count = 0;
        } else if state.request_count >= self.requests_per_minute {
            let pause = WINDOW - window_elapsed;
            info!(
                requests = state.request_count,
                limit = self.requests_per_minute,
                wait_secs = pause.as_secs_f64(),
                "Scrape budget exhausted, waiting for next window"
            );
            tokio::time::sleep(pause).await;
            state.window_start = Instant::now();
            state.request_count = 0;
        }

        state.request_count += 1;
        state.last_request = Some(Instant::now());
    }

    /// Requests recorded in the current window.
    pub async fn request_count(&self) -> u64 {
        self.state.lock().await.request_count
    }

    pub async fn stats(&self) -> ScrapeThrottleStats {
        ScrapeThrottleStats {
            requests_in_window: self.request_count().await,
            requests_per_minute: self.requests_per_minute,
            min_delay_ms: self.min_delay.as_millis() as u64,
        }
    }

    pub async fn reset(&self) {
        *self.state.lock().await = ThrottleState::fresh();
    }
}
