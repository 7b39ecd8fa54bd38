//! Fixed-window counter cache.
//!
//! A bounded `identifier -> count` map where every entry expires exactly one
//! window after it was last written. Reads refresh LRU recency but never extend
//! an entry's lifetime. Expired entries are dropped lazily when touched; there
//! is no background sweeper.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use super::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// Point-in-time statistics for a counter cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterCacheStats {
    /// Entries currently held (expired entries not yet touched included)
    pub entries: usize,
    /// Maximum number of distinct identifiers
    pub capacity: usize,
    /// Entries dropped to make room for a new identifier
    pub evictions: u64,
    /// Entries dropped because their window elapsed
    pub expirations: u64,
}

/// Bounded counter store with per-entry TTL and LRU eviction.
pub struct CounterCache {
    entries: Mutex<LruCache<String, CounterEntry>>,
    window: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl std::fmt::Debug for CounterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterCache")
            .field("window", &self.window)
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .finish()
    }
}

impl CounterCache {
    /// Create a cache using the system clock.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self::with_clock(capacity, window, Arc::new(SystemClock::new()))
    }

    /// Create a cache driven by the given clock.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_clock(capacity: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            window,
            capacity: capacity.get(),
            clock,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Current count for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let lookup = entries
            .get(key)
            .map(|entry| (entry.count, entry.expires_at > now));

        match lookup {
            Some((count, true)) => Some(count),
            Some((_, false)) => {
                entries.pop(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                trace!(key, "Counter entry expired");
                None
            }
            None => None,
        }
    }

    /// Store `count` for `key`, re-arming its expiry to one window from now.
    ///
    /// Inserting a new key while full evicts the least recently used entry.
    pub fn set(&self, key: &str, count: u64) {
        let entry = CounterEntry {
            count,
            expires_at: self.clock.now() + self.window,
        };

        let displaced = self.entries.lock().push(key.to_string(), entry);

        if let Some((evicted_key, _)) = displaced {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(evicted = %evicted_key, "Evicted least recently used counter");
            }
        }
    }

    /// Check whether `key` holds a live entry, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .peek(key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false)
    }

    /// Time left before `key` expires, without touching recency.
    pub fn time_to_expiry(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .lock()
            .peek(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }

    /// Remove `key`, returning its last count if it was present.
    pub fn remove(&self, key: &str) -> Option<u64> {
        self.entries.lock().pop(key).map(|entry| entry.count)
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of distinct identifiers tracked.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lifetime of an entry after its last write.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CounterCacheStats {
        CounterCacheStats {
            entries: self.len(),
            capacity: self.capacity,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockClock;

    fn cache(capacity: usize, window_secs: u64) -> (CounterCache, MockClock) {
        let clock = MockClock::new(Instant::now());
        let cache = CounterCache::with_clock(
            capacity,
            Duration::from_secs(window_secs),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn test_get_absent() {
        let (cache, _) = cache(10, 60);
        assert_eq!(cache.get("1.2.3.4"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache(10, 60);
        cache.set("1.2.3.4", 3);
        assert_eq!(cache.get("1.2.3.4"), Some(3));
        assert!(cache.contains("1.2.3.4"));
    }

    #[test]
    fn test_entry_expires_one_window_after_set() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1);

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_read_does_not_extend_lifetime() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1);

        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            assert_eq!(cache.get("a"), Some(1));
        }

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_time_to_expiry_follows_clock() {
        let (cache, clock) = cache(10, 60);
        assert_eq!(cache.time_to_expiry("a"), None);

        cache.set("a", 1);
        assert_eq!(cache.time_to_expiry("a"), Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.time_to_expiry("a"), Some(Duration::from_secs(15)));

        clock.advance(Duration::from_secs(15));
        assert_eq!(cache.time_to_expiry("a"), None);
    }

    #[test]
    fn test_write_rearms_lifetime() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1);

        clock.advance(Duration::from_secs(50));
        cache.set("a", 2);

        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (cache, _) = cache(2, 60);
        cache.set("a", 1);
        cache.set("b", 1);

        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get("a"), Some(1));

        cache.set("c", 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(1));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_is_not_an_eviction() {
        let (cache, _) = cache(2, 60);
        cache.set("a", 1);
        cache.set("b", 1);
        cache.set("a", 2);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let (cache, _) = cache(0, 60);
        assert_eq!(cache.capacity(), 1);
        cache.set("a", 1);
        cache.set("b", 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(1));
    }

    #[test]
    fn test_remove_and_clear() {
        let (cache, _) = cache(10, 60);
        cache.set("a", 4);
        cache.set("b", 2);
        assert_eq!(cache.remove("a"), Some(4));
        assert_eq!(cache.remove("a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
