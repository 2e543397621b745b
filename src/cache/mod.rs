//! Memoized computation cache shared by every analytics handler.
//!
//! [`ComputeCache::get_or_compute`] is the single entry point: a fresh entry
//! is returned immediately; on a miss the caller either starts the producer or
//! joins the computation another request already started for the same key.
//! Successful results are stored for the TTL of their [`TtlClass`]; failures
//! are handed back to every waiting caller and never stored.

pub mod coalesce;
pub mod error;
pub mod key;
pub mod store;
pub mod ttl;

pub use coalesce::{Coalescer, Role};
pub use error::{CacheError, KeyEncodingError, UnknownTtlClass};
pub use key::{ALL_SENTINEL, CacheKey};
pub use store::CacheStore;
pub use ttl::{MAX_TTL, TtlClass, TtlPolicy};

use crate::utils::log_if_slow;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ts_rs::TS;

/// Producers slower than this are logged at `warn`.
const SLOW_PRODUCER: Duration = Duration::from_secs(2);

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the store without running anything.
    Hit,
    /// This caller ran the producer.
    Computed,
    /// This caller waited on a computation started by another caller.
    Joined,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Hit => "HIT",
            Source::Computed => "MISS",
            Source::Joined => "COALESCED",
        }
    }
}

/// A cached or freshly computed value and where it came from.
#[derive(Debug, Clone)]
pub struct Fetched<V> {
    pub value: Arc<V>,
    pub source: Source,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    producer_errors: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time view of the cache's counters and occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Misses that joined an existing computation instead of starting one.
    pub coalesced: u64,
    pub producer_errors: u64,
    pub timeouts: u64,
}

/// Store + coalescer + TTL policy behind one handle. Clone-cheap.
pub struct ComputeCache<V = serde_json::Value, E = anyhow::Error> {
    store: CacheStore<V>,
    coalescer: Coalescer<Arc<V>, E>,
    policy: Arc<TtlPolicy>,
    counters: Arc<Counters>,
}

impl<V, E> Clone for ComputeCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            coalescer: self.coalescer.clone(),
            policy: Arc::clone(&self.policy),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<V, E> std::fmt::Debug for ComputeCache<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeCache")
            .field("store", &self.store)
            .field("coalescer", &self.coalescer)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<V, E> Default for ComputeCache<V, E>
where
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}

impl<V, E> ComputeCache<V, E>
where
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(policy: TtlPolicy) -> Self {
        Self::with_store(policy, CacheStore::new())
    }

    /// Like [`ComputeCache::new`], but the store evicts beyond `max_entries`.
    pub fn bounded(policy: TtlPolicy, max_entries: usize) -> Self {
        Self::with_store(policy, CacheStore::bounded(max_entries))
    }

    fn with_store(policy: TtlPolicy, store: CacheStore<V>) -> Self {
        Self {
            store,
            coalescer: Coalescer::new(),
            policy: Arc::new(policy),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `producer` runs at most once per key at a time; concurrent callers for
    /// the same key share its result, success or failure alike.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        ttl_class: TtlClass,
        producer: F,
    ) -> Result<Arc<V>, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.fetch(key, ttl_class, None, producer)
            .await
            .map(|fetched| fetched.value)
    }

    /// [`get_or_compute`](Self::get_or_compute) with a caller-scoped deadline.
    ///
    /// If `deadline` elapses first, this caller gets [`CacheError::Timeout`]
    /// while the computation continues for any other waiters.
    pub async fn get_or_compute_with_deadline<F, Fut>(
        &self,
        key: CacheKey,
        ttl_class: TtlClass,
        deadline: Duration,
        producer: F,
    ) -> Result<Arc<V>, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.fetch(key, ttl_class, Some(deadline), producer)
            .await
            .map(|fetched| fetched.value)
    }

    /// Derive the key from `namespace` and `filters`, then
    /// [`get_or_compute`](Self::get_or_compute).
    ///
    /// A key encoding failure is returned before `producer` is touched.
    pub async fn get_cached_or_compute<T, F, Fut>(
        &self,
        namespace: &str,
        filters: &T,
        ttl_class: TtlClass,
        producer: F,
    ) -> Result<Arc<V>, CacheError<E>>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let key = CacheKey::new(namespace, filters)?;
        self.get_or_compute(key, ttl_class, producer).await
    }

    /// The general form: optional deadline, and reports how the value was obtained.
    pub async fn fetch<F, Fut>(
        &self,
        key: CacheKey,
        ttl_class: TtlClass,
        deadline: Option<Duration>,
        producer: F,
    ) -> Result<Fetched<V>, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.store.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache hit");
            return Ok(Fetched {
                value,
                source: Source::Hit,
            });
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let ttl = self.policy.resolve(ttl_class);
        let store = self.store.clone();
        let counters = Arc::clone(&self.counters);
        let flight_key = key.clone();

        let waiter = self.coalescer.join(&key, move || async move {
            // The previous flight for this key may have stored its result
            // between our miss and our registration.
            if let Some(value) = store.get(&flight_key) {
                return Ok(value);
            }

            let start = Instant::now();
            match producer().await {
                Ok(value) => {
                    let value = Arc::new(value);
                    store.set(flight_key.clone(), Arc::clone(&value), ttl);
                    log_if_slow(start, SLOW_PRODUCER, flight_key.as_str());
                    debug!(key = %flight_key, ttl = ?ttl, "cached computed value");
                    Ok(value)
                }
                Err(err) => {
                    counters.producer_errors.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %flight_key, "producer failed, nothing cached");
                    Err(err)
                }
            }
        });

        let source = match waiter.role() {
            Role::Leader => Source::Computed,
            Role::Follower => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight computation");
                Source::Joined
            }
        };

        let outcome = match deadline {
            None => waiter.wait().await,
            Some(deadline) => match tokio::time::timeout(deadline, waiter.wait()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, waited = ?deadline, "detached from computation after deadline");
                    return Err(CacheError::Timeout {
                        key,
                        waited: deadline,
                    });
                }
            },
        };

        outcome
            .map(|value| Fetched { value, source })
            .map_err(CacheError::Producer)
    }

    /// Look up `key` without computing anything.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.store.get(key)
    }

    /// Store a value directly, bypassing the producer path.
    pub fn insert(&self, key: CacheKey, value: V, ttl_class: TtlClass) {
        self.store.set(key, value, self.policy.resolve(ttl_class));
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.remove(key)
    }

    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.store.remove_namespace(namespace)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Capacity of the store, if bounded.
    pub fn max_entries(&self) -> Option<usize> {
        self.store.max_entries()
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            in_flight: self.coalescer.in_flight(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            producer_errors: self.counters.producer_errors.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Spawn a task that purges expired entries every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("cache sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            info!(purged, remaining = cache.len(), "purged expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
