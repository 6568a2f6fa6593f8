//! Sliding-window limiter over request count and token volume.
//!
//! Used to throttle calls to metered external APIs. Callers that exceed the
//! window are suspended until capacity frees up rather than rejected.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{InsightError, Result};

/// Shortest suspension between admission attempts.
const MIN_WAIT: Duration = Duration::from_millis(100);

/// Current usage of a sliding window limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlidingWindowStats {
    pub current_rpm: u64,
    pub rpm_limit: u64,
    pub current_tpm: u64,
    pub tpm_limit: u64,
    pub rpm_remaining: u64,
    pub tpm_remaining: u64,
}

#[derive(Debug, Default)]
struct WindowState {
    /// Admission instants, oldest first
    requests: VecDeque<Instant>,
    /// Admission instants with their token estimate, oldest first
    tokens: VecDeque<(Instant, u64)>,
}

impl WindowState {
    fn evict(&mut self, now: Instant, window: Duration) {
        while matches!(self.requests.front(), Some(t) if now.duration_since(*t) >= window) {
            self.requests.pop_front();
        }
        while matches!(self.tokens.front(), Some((t, _)) if now.duration_since(*t) >= window) {
            self.tokens.pop_front();
        }
    }

    fn request_count(&self) -> u64 {
        self.requests.len() as u64
    }

    fn token_total(&self) -> u64 {
        self.tokens.iter().map(|(_, n)| n).sum()
    }
}

enum Admission {
    Admitted,
    Wait(Duration),
}

/// Dual-resource (requests + tokens) sliding window rate limiter.
///
/// The cleanup, decision and recording of an admission happen under one
/// lock, so two callers can never both claim the last unit of capacity.
/// Waiting callers queue on an async turnstile and are admitted in arrival
/// order.
pub struct SlidingWindowLimiter {
    max_requests: u64,
    max_tokens: u64,
    window: Duration,
    state: Mutex<WindowState>,
    turnstile: tokio::sync::Mutex<()>,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `max_requests` calls and `max_tokens`
    /// tokens within any trailing `window`.
    pub fn new(max_requests: u64, max_tokens: u64, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(InsightError::must_be_positive("max_requests"));
        }
        if max_tokens == 0 {
            return Err(InsightError::must_be_positive("max_tokens"));
        }
        if window.is_zero() {
            return Err(InsightError::must_be_positive("window"));
        }

        Ok(Self {
            max_requests,
            max_tokens,
            window,
            state: Mutex::new(WindowState::default()),
            turnstile: tokio::sync::Mutex::new(()),
        })
    }

    /// Per-minute limiter, the shape metered LLM APIs publish their quotas in.
    pub fn per_minute(requests_per_minute: u64, tokens_per_minute: u64) -> Result<Self> {
        Self::new(requests_per_minute, tokens_per_minute, Duration::from_secs(60))
    }

    /// Rough token estimate for `text`: one token per three characters.
    pub fn estimate_tokens(text: &str) -> u64 {
        (text.chars().count() as u64 / 3).max(1)
    }

    /// Wait until the call fits in the window, then record it.
    ///
    /// Dropping the returned future before it completes records nothing.
    #[instrument(level = "debug", skip(self))]
    pub async fn acquire(&self, estimated_tokens: u64) {
        let _turn = self.turnstile.lock().await;

        loop {
            match self.try_admit(estimated_tokens) {
                Admission::Admitted => return,
                Admission::Wait(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Usage after dropping entries that left the window. Records nothing.
    pub fn stats(&self) -> SlidingWindowStats {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.evict(now, self.window);

        let current_rpm = state.request_count();
        let current_tpm = state.token_total();

        SlidingWindowStats {
            current_rpm,
            rpm_limit: self.max_requests,
            current_tpm,
            tpm_limit: self.max_tokens,
            rpm_remaining: self.max_requests.saturating_sub(current_rpm),
            tpm_remaining: self.max_tokens.saturating_sub(current_tpm),
        }
    }

    /// Forget all recorded calls.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.tokens.clear();
        debug!("Sliding window limiter reset");
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn try_admit(&self, estimated_tokens: u64) -> Admission {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.evict(now, self.window);

        let current_rpm = state.request_count();
        let current_tpm = state.token_total();

        let rpm_ok = current_rpm < self.max_requests;
        // An estimate larger than the whole budget can only ever fit an empty window.
        let oversized = estimated_tokens > self.max_tokens && state.tokens.is_empty();
        let tpm_ok = current_tpm.saturating_add(estimated_tokens) <= self.max_tokens || oversized;

        if rpm_ok && tpm_ok {
            if oversized {
                warn!(
                    estimated_tokens,
                    tpm_limit = self.max_tokens,
                    "Token estimate exceeds the whole window budget, admitting into empty window"
                );
            }

            state.requests.push_back(now);
            if estimated_tokens > 0 {
                state.tokens.push_back((now, estimated_tokens));
            }

            debug!(
                rpm = current_rpm + 1,
                rpm_limit = self.max_requests,
                tpm = current_tpm + estimated_tokens,
                tpm_limit = self.max_tokens,
                "Rate limit check passed"
            );
            return Admission::Admitted;
        }

        let mut wait = Duration::ZERO;
        if !rpm_ok {
            let rpm_wait = self.time_until_exit(state.requests.front().copied(), now);
            info!(
                rpm = current_rpm,
                rpm_limit = self.max_requests,
                wait_secs = rpm_wait.as_secs_f64(),
                "RPM limit reached, waiting"
            );
            wait = wait.max(rpm_wait);
        }
        if !tpm_ok {
            let tpm_wait = self.time_until_exit(state.tokens.front().map(|(t, _)| *t), now);
            info!(
                tpm = current_tpm,
                tpm_limit = self.max_tokens,
                estimated_tokens,
                wait_secs = tpm_wait.as_secs_f64(),
                "TPM limit reached, waiting"
            );
            wait = wait.max(tpm_wait);
        }

        Admission::Wait(wait.max(MIN_WAIT))
    }

    /// Time until an entry recorded at `oldest` leaves the window.
    fn time_until_exit(&self, oldest: Option<Instant>, now: Instant) -> Duration {
        match oldest {
            Some(oldest) => self.window.saturating_sub(now.duration_since(oldest)),
            None => MIN_WAIT,
        }
    }
}
