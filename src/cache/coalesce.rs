//! Singleflight for cache misses.
//!
//! The first caller to miss on a key registers a flight: a shared future that
//! runs the producer exactly once. Callers arriving while it is in progress
//! attach to the same future instead of invoking their own producer. The
//! flight removes itself from the table as soon as it settles, whether the
//! producer succeeded or failed, so a failure is never replayed to later
//! callers.
//!
//! Each attached caller holds a [`Waiter`]. Dropping a waiter before the
//! flight settles (a request timing out or being cancelled) detaches it; when
//! the last waiter detaches, the flight is dropped along with its producer.

use crate::cache::key::CacheKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

type Outcome<T, E> = Result<T, Arc<E>>;
type SharedOutcome<T, E> = Shared<BoxFuture<'static, Outcome<T, E>>>;

struct Flight<T, E> {
    /// Distinguishes this flight from a later one registered under the same key.
    id: u64,
    future: SharedOutcome<T, E>,
    waiters: AtomicUsize,
}

/// Whether a waiter started the computation or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

pub struct Coalescer<T, E> {
    flights: Arc<DashMap<CacheKey, Flight<T, E>>>,
    next_id: Arc<AtomicU64>,
}

impl<T, E> Clone for Coalescer<T, E> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T, E> Default for Coalescer<T, E> {
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T, E> std::fmt::Debug for Coalescer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the flight for `key`, starting one with `producer` if none exists.
    ///
    /// `producer` is only called when this caller becomes the leader, and not
    /// until the returned waiter is first polled.
    pub fn join<F, Fut>(&self, key: &CacheKey, producer: F) -> Waiter<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (future, id, role) = match self.flights.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let flight = occupied.get();
                flight.waiters.fetch_add(1, Ordering::AcqRel);
                (flight.future.clone(), flight.id, Role::Follower)
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let flights = Arc::clone(&self.flights);
                let flight_key = key.clone();
                let future = async move {
                    let outcome = producer().await.map_err(Arc::new);
                    flights.remove_if(&flight_key, |_, flight| flight.id == id);
                    outcome
                }
                .boxed()
                .shared();
                vacant.insert(Flight {
                    id,
                    future: future.clone(),
                    waiters: AtomicUsize::new(1),
                });
                (future, id, Role::Leader)
            }
        };

        Waiter {
            future,
            role,
            guard: DetachGuard {
                flights: Arc::clone(&self.flights),
                key: key.clone(),
                id,
            },
        }
    }

    /// Run `producer` for `key` unless a flight is already running, then
    /// await the shared outcome.
    pub async fn coalesce<F, Fut>(&self, key: &CacheKey, producer: F) -> Outcome<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.join(key, producer).wait().await
    }

    /// Number of keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.flights.contains_key(key)
    }
}

/// One caller's handle on a flight.
pub struct Waiter<T, E> {
    future: SharedOutcome<T, E>,
    role: Role,
    guard: DetachGuard<T, E>,
}

impl<T, E> Waiter<T, E>
where
    T: Clone,
{
    pub fn role(&self) -> Role {
        self.role
    }

    pub async fn wait(self) -> Outcome<T, E> {
        let Waiter { future, guard, .. } = self;
        let outcome = future.await;
        drop(guard);
        outcome
    }
}

struct DetachGuard<T, E> {
    flights: Arc<DashMap<CacheKey, Flight<T, E>>>,
    key: CacheKey,
    id: u64,
}

impl<T, E> Drop for DetachGuard<T, E> {
    fn drop(&mut self) {
        // The count is only touched under the shard lock, so a follower cannot
        // attach between the last decrement and the removal.
        let abandoned = self
            .flights
            .remove_if(&self.key, |_, flight| {
                flight.id == self.id && flight.waiters.fetch_sub(1, Ordering::AcqRel) == 1
            })
            .is_some();
        if abandoned {
            debug!(key = %self.key, "all waiters detached, dropping in-flight computation");
        }
    }
}
