//! Validation cooldown tracking
//!
//! Remembers when each memory last received feedback so candidate selection
//! does not ask about it again too soon. State is owned by one learning loop
//! and bounded by an LRU; it is advisory, not a lock.

use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

/// Default capacity for the cooldown cache
pub const DEFAULT_COOLDOWN_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct Cooldown {
    cache: LruCache<String, DateTime<Utc>>,
    window: Duration,
}

impl Cooldown {
    /// A zero capacity falls back to [`DEFAULT_COOLDOWN_CAPACITY`]
    pub fn new(capacity: usize, window: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_COOLDOWN_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record feedback on `id` at `at`
    pub fn record(&mut self, id: &str, at: DateTime<Utc>) {
        self.cache.put(id.to_string(), at);
    }

    /// True while `id` is inside its cooldown window at `now`
    pub fn is_cooling(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.cache.get(id) {
            Some(at) => now - *at < self.window,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_CAPACITY, Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cooldown_is_empty() {
        let cooldown = Cooldown::new(100, Duration::hours(1));
        assert!(cooldown.is_empty());
        assert_eq!(cooldown.capacity(), 100);
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        let cooldown = Cooldown::new(0, Duration::hours(1));
        assert_eq!(cooldown.capacity(), DEFAULT_COOLDOWN_CAPACITY);
    }

    #[test]
    fn test_window_expires() {
        let mut cooldown = Cooldown::new(10, Duration::hours(24));
        let t0 = Utc::now();
        cooldown.record("m1", t0);

        assert!(cooldown.is_cooling("m1", t0 + Duration::hours(23)));
        assert!(!cooldown.is_cooling("m1", t0 + Duration::hours(24)));
        assert!(!cooldown.is_cooling("m2", t0));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cooldown = Cooldown::new(2, Duration::hours(1));
        let now = Utc::now();
        cooldown.record("a", now);
        cooldown.record("b", now);
        cooldown.record("c", now);

        assert_eq!(cooldown.len(), 2);
        assert!(!cooldown.is_cooling("a", now));
        assert!(cooldown.is_cooling("c", now));
    }

    #[test]
    fn test_instances_are_independent() {
        let now = Utc::now();
        let mut first = Cooldown::default();
        let mut second = Cooldown::default();
        first.record("shared", now);
        assert!(first.is_cooling("shared", now));
        assert!(!second.is_cooling("shared", now));
    }
}
