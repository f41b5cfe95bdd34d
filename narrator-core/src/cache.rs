//! TTL-based cache.
//!
//! Entries carry their own time-to-live and are checked on every read: an
//! entry older than its TTL is never returned, even if it has not been
//! purged yet. Expired entries are swept on insert once the map grows past
//! a threshold, so a stream of distinct keys cannot grow it without bound.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default size at which an insert first sweeps expired entries.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 256;

/// A thread-safe cache with per-entry expiration.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, TtlEntry<V>>>,
    sweep_threshold: usize,
    // Only written while holding the write lock.
    next_sweep: AtomicUsize,
}

struct TtlEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> TtlEntry<V> {
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_sweep_threshold(DEFAULT_SWEEP_THRESHOLD)
    }

    /// A cache that sweeps expired entries once it holds `threshold` of them.
    pub fn with_sweep_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            entries: RwLock::new(HashMap::new()),
            sweep_threshold: threshold,
            next_sweep: AtomicUsize::new(threshold),
        }
    }

    /// Insert a value, replacing any existing entry and resetting its TTL.
    ///
    /// When the map has reached the sweep size, expired entries are dropped
    /// first. If most entries are still fresh the next sweep waits until the
    /// map has doubled, which keeps inserts amortized O(1).
    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let entry = TtlEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        let mut guard = self.entries.write().await;
        if guard.len() >= self.next_sweep.load(Ordering::Relaxed) {
            guard.retain(|_, entry| entry.is_fresh());
            let next = (guard.len() * 2).max(self.sweep_threshold);
            self.next_sweep.store(next, Ordering::Relaxed);
        }
        guard.insert(key, entry);
    }

    /// Get a value if it exists and hasn't expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().await;
        guard
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone())
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.get(key).await.is_some()
    }

    /// Remove all expired entries and return how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|_, entry| entry.is_fresh());
        before - guard.len()
    }

    /// Number of entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let cache: TtlCache<String, i32> = TtlCache::new();
        cache.insert("key".to_string(), 42, Duration::from_secs(60)).await;
        assert_eq!(cache.get(&"key".to_string()).await, Some(42));
        assert!(cache.get(&"missing".to_string()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_not_returned() {
        let cache: TtlCache<&str, i32> = TtlCache::new();
        cache.insert("short", 1, Duration::from_secs(5)).await;
        cache.insert("long", 2, Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.get(&"short").await, None);
        assert_eq!(cache.get(&"long").await, Some(2));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_expired() {
        let cache: TtlCache<&str, i32> = TtlCache::new();
        cache.insert("a", 1, Duration::from_secs(1)).await;
        cache.insert("b", 2, Duration::from_secs(1)).await;
        cache.insert("c", 3, Duration::from_secs(30)).await;

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired().await, 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.contains(&"c").await);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweeps_expired_past_threshold() {
        let cache: TtlCache<u32, u32> = TtlCache::with_sweep_threshold(8);
        for i in 0..100 {
            cache.insert(i, i, Duration::from_secs(1)).await;
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        assert!(cache.len().await <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_survive_sweep() {
        let cache: TtlCache<u32, u32> = TtlCache::with_sweep_threshold(4);
        for i in 0..10 {
            cache.insert(i, i, Duration::from_secs(60)).await;
        }
        assert_eq!(cache.len().await, 10);
        for i in 0..10 {
            assert_eq!(cache.get(&i).await, Some(i));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_resets_ttl() {
        let cache: TtlCache<&str, i32> = TtlCache::new();
        cache.insert("k", 1, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", 2, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&"k").await, Some(2));
    }
}
