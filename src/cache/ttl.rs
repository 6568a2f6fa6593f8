//! TTL cache with creation-order eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::{self, SharedClock};
use crate::error::{InsightError, Result};

/// A cached value together with its lifetime bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Insertion sequence, breaks ties between equal creation times
    sequence: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub active: usize,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
}

/// A thread-safe key/value cache with per-entry expiry.
///
/// When full, inserting a new key evicts the entry that was created first,
/// regardless of how recently it was read.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    max_entries: usize,
    clock: SharedClock,
    next_sequence: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache using the system clock.
    pub fn new(default_ttl: Duration, max_entries: usize) -> Result<Self> {
        Self::with_clock(default_ttl, max_entries, clock::system())
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(
        default_ttl: Duration,
        max_entries: usize,
        clock: SharedClock,
    ) -> Result<Self> {
        if default_ttl.is_zero() {
            return Err(InsightError::must_be_positive("default_ttl"));
        }
        if max_entries == 0 {
            return Err(InsightError::must_be_positive("max_entries"));
        }

        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries,
            clock,
            next_sequence: AtomicU64::new(0),
        })
    }

    /// Look up a fresh value. Expired entries are removed on read.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::get_fresh(&mut entries, key, now)
    }

    /// Store a value, using the default TTL when `ttl` is `None`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.insert(&mut entries, key.into(), value, ttl, now);
    }

    /// Return the cached value, or compute, store and return a new one.
    ///
    /// The lock is held while `factory` runs, so concurrent misses on the
    /// same key invoke the factory once.
    ///
    /// `factory` must not touch this cache: the lock is not reentrant and
    /// any cache call from inside it deadlocks.
    pub fn get_or_set<F>(&self, key: &str, factory: F, ttl: Option<Duration>) -> V
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if let Some(value) = Self::get_fresh(&mut entries, key, now) {
            return value;
        }

        trace!(key = %key, "Cache miss, computing value");
        let value = factory();
        self.insert(&mut entries, key.to_string(), value.clone(), ttl, now);
        value
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove keys matching `pattern`.
    ///
    /// A trailing `*` matches every key with that prefix; otherwise the
    /// pattern must equal the key.
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock();

        let removed = match pattern.strip_suffix('*') {
            Some(prefix) => {
                let before = entries.len();
                entries.retain(|key, _| !key.starts_with(prefix));
                before - entries.len()
            }
            None => usize::from(entries.remove(pattern).is_some()),
        };

        debug!(pattern = %pattern, removed, "Deleted cache entries by pattern");
        removed
    }

    /// Remove everything. Returns the number of entries dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Remove expired entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();

        CacheStats {
            total: entries.len(),
            expired,
            active: entries.len() - expired,
            max_entries: self.max_entries,
            default_ttl_secs: self.default_ttl.as_secs(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_fresh(
        entries: &mut HashMap<String, CacheEntry<V>>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<V> {
        let expired = entries.get(key)?.is_expired(now);
        if expired {
            entries.remove(key);
            trace!(key = %key, "Dropped expired cache entry");
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, CacheEntry<V>>,
        key: String,
        value: V,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            Self::evict_oldest(entries);
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: clock::add(now, ttl),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    fn evict_oldest(entries: &mut HashMap<String, CacheEntry<V>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| (entry.created_at, entry.sequence))
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            entries.remove(&key);
            debug!(key = %key, "Evicted oldest cache entry");
        }
    }
}
