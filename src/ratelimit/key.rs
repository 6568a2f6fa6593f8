//! Caller identity keys and path exclusion for HTTP rate limiting.

use std::fmt;
use std::net::IpAddr;

/// Number of API key characters kept in a rate limit key.
pub const API_KEY_PREFIX_LEN: usize = 16;

/// Identifies the caller a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Leading characters of the caller's API key
    ApiKey(String),
    /// Client address, or `unknown` when none could be determined
    Ip(String),
}

impl RateLimitKey {
    /// Derive a key from the request's identifying parts.
    ///
    /// Preference order: API key prefix, first `X-Forwarded-For` address,
    /// direct peer address, then `ip:unknown`. Any non-empty API key header
    /// counts, whitespace included; only the forwarded address is trimmed.
    pub fn from_parts(
        api_key: Option<&str>,
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
    ) -> Self {
        if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
            let prefix: String = api_key.chars().take(API_KEY_PREFIX_LEN).collect();
            return RateLimitKey::ApiKey(prefix);
        }

        let forwarded = forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match (forwarded, peer) {
            (Some(ip), _) => RateLimitKey::Ip(ip.to_string()),
            (None, Some(peer)) => RateLimitKey::Ip(peer.to_string()),
            (None, None) => RateLimitKey::Ip("unknown".to_string()),
        }
    }

    /// Client address for request logging, if this key is address based.
    pub fn client_ip(&self) -> Option<&str> {
        match self {
            RateLimitKey::Ip(ip) => Some(ip),
            RateLimitKey::ApiKey(_) => None,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::ApiKey(prefix) => write!(f, "api:{}", prefix),
            RateLimitKey::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Path prefixes that bypass rate limiting and request logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedPaths {
    prefixes: Vec<String>,
}

impl ExcludedPaths {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Default for ExcludedPaths {
    fn default() -> Self {
        Self::new(["/health", "/static", "/favicon.ico"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_preferred_and_truncated() {
        let key = RateLimitKey::from_parts(
            Some("sk-abcdefghijklmnopqrstuvwxyz"),
            Some("1.2.3.4"),
            Some("10.0.0.1".parse().unwrap()),
        );

        assert_eq!(key, RateLimitKey::ApiKey("sk-abcdefghijklm".to_string()));
        assert_eq!(key.to_string(), "api:sk-abcdefghijklm");
    }

    #[test]
    fn test_api_key_taken_verbatim() {
        let key = RateLimitKey::from_parts(Some("   "), Some("1.2.3.4"), None);
        assert_eq!(key, RateLimitKey::ApiKey("   ".to_string()));

        let key = RateLimitKey::from_parts(Some(" sk-key"), None, None);
        assert_eq!(key.to_string(), "api: sk-key");
    }

    #[test]
    fn test_first_forwarded_address_used() {
        let key = RateLimitKey::from_parts(
            None,
            Some(" 203.0.113.7 , 10.0.0.2"),
            Some("10.0.0.1".parse().unwrap()),
        );
        assert_eq!(key.to_string(), "ip:203.0.113.7");
    }

    #[test]
    fn test_peer_address_fallback() {
        let key = RateLimitKey::from_parts(Some(""), Some(""), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(key.to_string(), "ip:10.0.0.1");
        assert_eq!(key.client_ip(), Some("10.0.0.1"));
    }

    #[test]
    fn test_unknown_sentinel() {
        let key = RateLimitKey::from_parts(None, None, None);
        assert_eq!(key.to_string(), "ip:unknown");
    }

    #[test]
    fn test_excluded_paths() {
        let excluded = ExcludedPaths::default();

        assert!(excluded.is_excluded("/health"));
        assert!(excluded.is_excluded("/static/css/app.css"));
        assert!(excluded.is_excluded("/favicon.ico"));
        assert!(!excluded.is_excluded("/api/stats/requests"));
        assert!(!excluded.is_excluded("/"));
    }
}
