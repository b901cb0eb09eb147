//! Bounded cache with per-entry expiry.
//!
//! The caller owns the cache and passes the clock in, so there is no hidden
//! global state and expiry is testable without sleeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TimedCache<K, V> {
    entries: HashMap<K, (V, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// The cached value if it was inserted less than `ttl` before `now`.
    pub fn get(&self, key: &K, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|(_, inserted)| !self.is_expired(*inserted, now))
            .map(|(value, _)| value.clone())
    }

    /// Insert or refresh `key`. At capacity, expired entries go first, then the oldest.
    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, (_, inserted))| *inserted)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(key, (value, now));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted)| now.saturating_duration_since(*inserted) < ttl);
    }

    fn is_expired(&self, inserted: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted) >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let start = Instant::now();
        let mut cache = TimedCache::new(4, Duration::from_secs(300));
        cache.insert("a", true, start);

        assert_eq!(cache.get(&"a", start + Duration::from_secs(299)), Some(true));
        assert_eq!(cache.get(&"a", start + Duration::from_secs(300)), None);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let start = Instant::now();
        let mut cache = TimedCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1, start);
        cache.insert("b", 2, start + Duration::from_secs(1));
        cache.insert("c", 3, start + Duration::from_secs(2));

        let now = start + Duration::from_secs(3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a", now), None);
        assert_eq!(cache.get(&"b", now), Some(2));
        assert_eq!(cache.get(&"c", now), Some(3));
    }

    #[test]
    fn expired_entries_are_purged_before_eviction() {
        let start = Instant::now();
        let mut cache = TimedCache::new(2, Duration::from_secs(10));
        cache.insert("stale", 1, start);
        cache.insert("fresh", 2, start + Duration::from_secs(8));

        let later = start + Duration::from_secs(12);
        cache.insert("new", 3, later);
        assert_eq!(cache.get(&"fresh", later), Some(2));
        assert_eq!(cache.get(&"new", later), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn refreshing_a_key_does_not_evict() {
        let start = Instant::now();
        let mut cache = TimedCache::new(1, Duration::from_secs(10));
        cache.insert("a", 1, start);
        cache.insert("a", 2, start + Duration::from_secs(5));

        assert_eq!(cache.get(&"a", start + Duration::from_secs(12)), Some(2));
    }

    #[test]
    fn invalidate_and_clear() {
        let start = Instant::now();
        let mut cache = TimedCache::new(4, Duration::from_secs(10));
        cache.insert("a", 1, start);
        cache.insert("b", 2, start);

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a", start), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
