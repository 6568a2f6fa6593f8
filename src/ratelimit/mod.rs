//! Rate limiting: admission control for HTTP callers and outbound API calls.

mod fixed;
mod key;
mod keyed;
mod sliding;
mod throttle;

pub use fixed::{
    FixedWindowEntry, FixedWindowLimiter, FixedWindowStats, RateLimitDecision, RateLimitMetadata,
};
pub use key::{ExcludedPaths, RateLimitKey, API_KEY_PREFIX_LEN};
pub use keyed::ApiKeyLimiters;
pub use sliding::{SlidingWindowLimiter, SlidingWindowStats};
pub use throttle::{ScrapeThrottle, ScrapeThrottleStats};
