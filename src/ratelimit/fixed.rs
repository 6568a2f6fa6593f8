//! Fixed-window per-key limiter used on the HTTP request path.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::clock::{self, SharedClock};
use crate::error::{InsightError, Result};

/// Request counter for one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowEntry {
    /// Requests seen since `window_start`, denied ones included
    pub count: u64,
    pub window_start: DateTime<Utc>,
}

impl FixedWindowEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }
}

/// Limit bookkeeping returned with every decision, allowed or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitMetadata {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp (seconds) at which the current window ends
    pub reset: i64,
}

impl RateLimitMetadata {
    /// Whole seconds from `now` until the window resets, never negative.
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        (self.reset - now.timestamp()).max(0) as u64
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub metadata: RateLimitMetadata,
}

/// Occupancy of a fixed-window limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedWindowStats {
    pub total_tracked: usize,
    pub active_entries: usize,
    pub max_requests: u64,
    pub window_secs: u64,
}

/// Per-key fixed-window rate limiter.
///
/// Denied requests still increment the counter, so a key under sustained
/// abuse shows counts above the limit until its window resets.
pub struct FixedWindowLimiter {
    max_requests: u64,
    window: Duration,
    sweep_interval: Duration,
    entries: DashMap<String, FixedWindowEntry>,
    last_sweep: Mutex<DateTime<Utc>>,
    clock: SharedClock,
}

impl FixedWindowLimiter {
    /// Create a limiter using the system clock.
    pub fn new(max_requests: u64, window: Duration, sweep_interval: Duration) -> Result<Self> {
        Self::with_clock(max_requests, window, sweep_interval, clock::system())
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        max_requests: u64,
        window: Duration,
        sweep_interval: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        if max_requests == 0 {
            return Err(InsightError::must_be_positive("max_requests"));
        }
        if window.is_zero() {
            return Err(InsightError::must_be_positive("window"));
        }
        if sweep_interval.is_zero() {
            return Err(InsightError::must_be_positive("sweep_interval"));
        }

        let now = clock.now();
        Ok(Self {
            max_requests,
            window,
            sweep_interval,
            entries: DashMap::new(),
            last_sweep: Mutex::new(now),
            clock,
        })
    }

    /// Count a request for `key` and decide whether it is within the limit.
    pub fn is_allowed(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        self.maybe_sweep(now);

        // The map entry guard holds the shard lock, linearizing checks per key.
        let (count, window_start) = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| FixedWindowEntry::new(now));

            if clock::elapsed(entry.window_start, now) > self.window {
                *entry = FixedWindowEntry::new(now);
            }
            entry.count += 1;
            (entry.count, entry.window_start)
        };

        let metadata = RateLimitMetadata {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset: clock::add(window_start, self.window).timestamp(),
        };

        let allowed = count <= self.max_requests;
        if allowed {
            trace!(key = %key, count, limit = self.max_requests, "Request allowed");
        } else {
            warn!(key = %key, count, limit = self.max_requests, "Rate limit exceeded");
        }

        RateLimitDecision { allowed, metadata }
    }

    /// Current counter for `key`, if tracked.
    pub fn entry(&self, key: &str) -> Option<FixedWindowEntry> {
        self.entries.get(key).map(|e| *e)
    }

    pub fn stats(&self) -> FixedWindowStats {
        let now = self.clock.now();
        let active_entries = self
            .entries
            .iter()
            .filter(|e| clock::elapsed(e.window_start, now) <= self.window)
            .count();

        FixedWindowStats {
            total_tracked: self.entries.len(),
            active_entries,
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
        }
    }

    /// Drop every tracked key.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remove keys whose window went stale, at most once per sweep interval.
    fn maybe_sweep(&self, now: DateTime<Utc>) {
        {
            let mut last_sweep = self.last_sweep.lock();
            if clock::elapsed(*last_sweep, now) < self.sweep_interval {
                return;
            }
            *last_sweep = now;
        }

        let stale_after = self.window * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| clock::elapsed(entry.window_start, now) <= stale_after);
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(removed, "Swept stale rate limit entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn limiter(max: u64) -> (FixedWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = FixedWindowLimiter::with_clock(
            max,
            Duration::from_secs(60),
            Duration::from_secs(300),
            clock.clone(),
        )
        .unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let window = Duration::from_secs(60);
        assert!(FixedWindowLimiter::new(0, window, window).is_err());
        assert!(FixedWindowLimiter::new(1, Duration::ZERO, window).is_err());
        assert!(FixedWindowLimiter::new(1, window, Duration::ZERO).is_err());
    }

    #[test]
    fn test_remaining_decreases_then_denies() {
        let (limiter, clock) = limiter(3);

        for expected in [2, 1, 0] {
            let decision = limiter.is_allowed("ip:1.2.3.4");
            assert!(decision.allowed);
            assert_eq!(decision.metadata.remaining, expected);
            assert_eq!(decision.metadata.limit, 3);
        }

        let denied = limiter.is_allowed("ip:1.2.3.4");
        assert!(!denied.allowed);
        assert_eq!(denied.metadata.remaining, 0);
        assert!(denied.metadata.retry_after(clock.now()) <= 60);
    }

    #[test]
    fn test_reset_is_window_end() {
        let (limiter, clock) = limiter(3);
        let start = clock.now();

        let decision = limiter.is_allowed("k");
        assert_eq!(decision.metadata.reset, start.timestamp() + 60);

        clock.advance(Duration::from_secs(20));
        let decision = limiter.is_allowed("k");
        assert_eq!(decision.metadata.reset, start.timestamp() + 60);
        assert!((39..=40).contains(&decision.metadata.retry_after(clock.now())));
    }

    #[test]
    fn test_denied_requests_keep_counting() {
        let (limiter, _clock) = limiter(2);

        for _ in 0..5 {
            limiter.is_allowed("abuser");
        }

        assert_eq!(limiter.entry("abuser").unwrap().count, 5);
    }

    #[test]
    fn test_window_reset_allows_again() {
        let (limiter, clock) = limiter(3);

        for _ in 0..4 {
            limiter.is_allowed("k");
        }
        assert!(!limiter.is_allowed("k").allowed);

        // Exactly one window later the old window is still current.
        clock.advance(Duration::from_secs(60));
        assert!(!limiter.is_allowed("k").allowed);

        clock.advance(Duration::from_secs(1));
        let decision = limiter.is_allowed("k");
        assert!(decision.allowed);
        assert_eq!(decision.metadata.remaining, 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter(1);

        assert!(limiter.is_allowed("ip:10.0.0.1").allowed);
        assert!(!limiter.is_allowed("ip:10.0.0.1").allowed);
        assert!(limiter.is_allowed("ip:10.0.0.2").allowed);
    }

    #[test]
    fn test_sweep_removes_stale_entries_after_interval() {
        let (limiter, clock) = limiter(10);

        limiter.is_allowed("old");
        clock.advance(Duration::from_secs(200));
        limiter.is_allowed("recent");

        // Sweep interval not yet elapsed: "old" survives though stale.
        assert_eq!(limiter.stats().total_tracked, 2);

        clock.advance(Duration::from_secs(100));
        limiter.is_allowed("trigger");

        assert!(limiter.entry("old").is_none());
        assert!(limiter.entry("recent").is_some());
        assert!(limiter.entry("trigger").is_some());
    }

    #[test]
    fn test_stats() {
        let (limiter, clock) = limiter(10);

        limiter.is_allowed("a");
        clock.advance(Duration::from_secs(61));
        limiter.is_allowed("b");

        assert_eq!(
            limiter.stats(),
            FixedWindowStats {
                total_tracked: 2,
                active_entries: 1,
                max_requests: 10,
                window_secs: 60,
            }
        );

        limiter.clear();
        assert_eq!(limiter.stats().total_tracked, 0);
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_limit() {
        let limiter = Arc::new(
            FixedWindowLimiter::new(50, Duration::from_secs(60), Duration::from_secs(300)).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.is_allowed("shared").allowed).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(limiter.entry("shared").unwrap().count, 200);
    }
}
