//! Per-API-key limiters, each with the key's own request budget.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::fixed::{FixedWindowLimiter, RateLimitDecision};
use crate::clock::{self, SharedClock};
use crate::error::Result;

/// Holds one fixed-window limiter per API key id.
pub struct ApiKeyLimiters {
    limiters: DashMap<u64, Arc<FixedWindowLimiter>>,
    window: Duration,
    sweep_interval: Duration,
    clock: SharedClock,
}

impl ApiKeyLimiters {
    pub fn new(window: Duration, sweep_interval: Duration) -> Self {
        Self::with_clock(window, sweep_interval, clock::system())
    }

    pub fn with_clock(window: Duration, sweep_interval: Duration, clock: SharedClock) -> Self {
        Self {
            limiters: DashMap::new(),
            window,
            sweep_interval,
            clock,
        }
    }

    /// The limiter for `api_key_id`, created with `rate_limit` on first use.
    ///
    /// A limiter keeps the budget it was created with; later calls with a
    /// different `rate_limit` do not resize it.
    pub fn limiter(&self, api_key_id: u64, rate_limit: u64) -> Result<Arc<FixedWindowLimiter>> {
        if let Some(existing) = self.limiters.get(&api_key_id) {
            return Ok(existing.clone());
        }

        let limiter = self
            .limiters
            .entry(api_key_id)
            .or_try_insert_with(|| {
                debug!(api_key_id, rate_limit, "Creating API key rate limiter");
                FixedWindowLimiter::with_clock(
                    rate_limit,
                    self.window,
                    self.sweep_interval,
                    self.clock.clone(),
                )
                .map(Arc::new)
            })?
            .clone();

        Ok(limiter)
    }

    pub fn is_allowed(&self, api_key_id: u64, rate_limit: u64) -> Result<RateLimitDecision> {
        let limiter = self.limiter(api_key_id, rate_limit)?;
        Ok(limiter.is_allowed(&api_key_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiters() -> (ApiKeyLimiters, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let limiters = ApiKeyLimiters::with_clock(
            Duration::from_secs(60),
            Duration::from_secs(300),
            clock.clone(),
        );
        (limiters, clock)
    }

    #[test]
    fn test_each_key_has_own_budget() {
        let (limiters, _clock) = limiters();

        assert!(limiters.is_allowed(1, 1).unwrap().allowed);
        assert!(!limiters.is_allowed(1, 1).unwrap().allowed);

        for _ in 0..3 {
            assert!(limiters.is_allowed(2, 3).unwrap().allowed);
        }
        assert!(!limiters.is_allowed(2, 3).unwrap().allowed);
        assert_eq!(limiters.len(), 2);
    }

    #[test]
    fn test_budget_fixed_at_creation() {
        let (limiters, _clock) = limiters();

        limiters.is_allowed(7, 2).unwrap();
        let decision = limiters.is_allowed(7, 100).unwrap();

        assert_eq!(decision.metadata.limit, 2);
        assert_eq!(decision.metadata.remaining, 0);
    }

    #[test]
    fn test_window_resets_per_key() {
        let (limiters, clock) = limiters();

        limiters.is_allowed(3, 1).unwrap();
        assert!(!limiters.is_allowed(3, 1).unwrap().allowed);

        clock.advance(Duration::from_secs(61));
        assert!(limiters.is_allowed(3, 1).unwrap().allowed);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let (limiters, _clock) = limiters();
        assert!(limiters.is_allowed(9, 0).is_err());
        assert!(limiters.is_empty());
    }
}
