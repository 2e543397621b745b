//! Concurrent key → (value, expiry) table with lazy eviction.
//!
//! Entries are sharded across a `DashMap`, so unrelated keys never contend on
//! a single lock. Expiry is checked on read: a stale entry is evicted by the
//! `get` that finds it. [`CacheStore::purge_expired`] exists for the
//! background sweeper and for making room under a capacity bound.

use crate::cache::key::CacheKey;
use crate::cache::ttl::MAX_TTL;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Entries inspected per eviction once a bounded store is full.
const EVICTION_SAMPLE: usize = 16;

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct CacheStore<V> {
    entries: Arc<DashMap<CacheKey, Entry<V>>>,
    /// Soft cap on stored entries; `None` means unbounded.
    max_entries: Option<usize>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            max_entries: self.max_entries,
        }
    }
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<V> CacheStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: None,
        }
    }

    /// A store that evicts once it holds `max_entries` entries.
    ///
    /// Eviction inspects a sample of up to 16 entries rather than the whole
    /// table: an expired one goes first, otherwise whichever sampled entry
    /// expires soonest. Full expiry sweeps are left to
    /// [`purge_expired`](Self::purge_expired).
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: Some(max_entries.max(1)),
        }
    }

    /// Return the value for `key` if present and unexpired.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(Arc::clone(&entry.value));
            }
        }
        // A concurrent `set` may have refreshed the entry since the read guard
        // was dropped; only evict what is still stale.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            trace!(key = %key, "evicted expired cache entry");
        }
        None
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    ///
    /// `ttl` is capped at [`MAX_TTL`].
    pub fn set(&self, key: CacheKey, value: impl Into<Arc<V>>, ttl: Duration) {
        if let Some(cap) = self.max_entries {
            if self.entries.len() >= cap && !self.entries.contains_key(&key) {
                self.make_room(cap);
            }
        }
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.entries.insert(
            key,
            Entry {
                value: value.into(),
                expires_at,
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose key belongs to `namespace`. Returns the count removed.
    pub fn remove_namespace(&self, namespace: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = key.namespace() != namespace;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evict every expired entry. Returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, including stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    fn make_room(&self, cap: usize) {
        let now = Instant::now();
        while self.entries.len() >= cap {
            // The iterator holds shard read locks; pick the victim before removing.
            let victim = self
                .entries
                .iter()
                .take(EVICTION_SAMPLE)
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| (entry.key().clone(), entry.value().is_expired(now)));
            let Some((victim, expired)) = victim else {
                return;
            };
            self.entries.remove(&victim);
            trace!(key = %victim, expired, "evicted entry to stay under capacity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(ns: &str, brand: &str) -> CacheKey {
        CacheKey::new(ns, &json!({ "brand": brand })).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_fresh_values() {
        let store: CacheStore<u32> = CacheStore::new();
        store.set(key("ns", "a"), 7_u32, Duration::from_secs(10));
        assert_eq!(store.get(&key("ns", "a")).as_deref(), Some(&7));
        assert!(store.get(&key("ns", "b")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_miss_and_are_evicted() {
        let store: CacheStore<u32> = CacheStore::new();
        store.set(key("ns", "a"), 1_u32, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get(&key("ns", "a")).is_some());

        // now == expires_at counts as expired
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.len(), 1);
        assert!(store.get(&key("ns", "a")).is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_resets_expiry() {
        let store: CacheStore<u32> = CacheStore::new();
        store.set(key("ns", "a"), 1_u32, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set(key("ns", "a"), 2_u32, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get(&key("ns", "a")).as_deref(), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_only_drops_stale_entries() {
        let store: CacheStore<u32> = CacheStore::new();
        store.set(key("ns", "short"), 1_u32, Duration::from_secs(5));
        store.set(key("ns", "long"), 2_u32, Duration::from_secs(50));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&key("ns", "long")).is_some());
    }

    #[tokio::test]
    async fn remove_namespace_leaves_other_namespaces() {
        let store: CacheStore<u32> = CacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set(key("trend-data", "a"), 1_u32, ttl);
        store.set(key("trend-data", "b"), 2_u32, ttl);
        store.set(key("summary-metrics", "a"), 3_u32, ttl);

        assert_eq!(store.remove_namespace("trend-data"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&key("summary-metrics", "a")).is_some());

        assert!(store.remove(&key("summary-metrics", "a")));
        assert!(!store.remove(&key("summary-metrics", "a")));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_store_prefers_expired_then_soonest_victims() {
        let store: CacheStore<u32> = CacheStore::bounded(2);
        store.set(key("ns", "stale"), 1_u32, Duration::from_secs(1));
        store.set(key("ns", "late"), 2_u32, Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set(key("ns", "new"), 3_u32, Duration::from_secs(50));
        assert_eq!(store.len(), 2);
        assert!(store.get(&key("ns", "late")).is_some());

        // Nothing expired: the entry closest to expiry ("new") makes way.
        store.set(key("ns", "newest"), 4_u32, Duration::from_secs(200));
        assert_eq!(store.len(), 2);
        assert!(store.get(&key("ns", "new")).is_none());
        assert!(store.get(&key("ns", "late")).is_some());
        assert!(store.get(&key("ns", "newest")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_inspects_a_bounded_sample() {
        let cap = EVICTION_SAMPLE * 4;
        let store: CacheStore<u32> = CacheStore::bounded(cap);
        for i in 0..cap {
            store.set(key("ns", &i.to_string()), i as u32, Duration::from_secs(100 + i as u64));
        }
        for i in 0..cap {
            store.set(key("extra", &i.to_string()), 0_u32, Duration::from_secs(1_000));
            assert_eq!(store.len(), cap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttls_are_capped_instead_of_overflowing() {
        let store: CacheStore<u32> = CacheStore::new();
        store.set(key("ns", "a"), 1_u32, Duration::MAX);
        tokio::time::advance(MAX_TTL - Duration::from_secs(1)).await;
        assert_eq!(store.get(&key("ns", "a")).as_deref(), Some(&1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key("ns", "a")).is_none());
    }

    #[tokio::test]
    async fn overwriting_at_capacity_does_not_evict() {
        let store: CacheStore<u32> = CacheStore::bounded(1);
        store.set(key("ns", "a"), 1_u32, Duration::from_secs(60));
        store.set(key("ns", "a"), 2_u32, Duration::from_secs(60));
        assert_eq!(store.get(&key("ns", "a")).as_deref(), Some(&2));
    }
}
