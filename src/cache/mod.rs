//! Generic TTL cache with single-flight population, used for Twitch users,
//! Discord users and sessions.
//!
//! Entries carry the time they were retrieved. A background sweeper scans the
//! whole map `SWEEPS_PER_EXPIRATION` times per expiration window and drops
//! anything older than the expiration, so an entry is gone at the latest
//! `expiration + expiration / 10` after it was stored. Lookups also check the
//! age themselves, which means an expired entry is never *returned* even when the
//! next sweep has not happened yet.
//!
//! Misses are coalesced: while a retrieval for a key is running, further misses
//! for that key await the same shared future instead of starting their own.
//! The shared future stores its result and clears the in-flight marker itself,
//! so a caller that gives up early does not strand the others.
mod key;
mod stats;

pub use key::{CacheKey, KeyParse};
pub use stats::{CacheStats, CacheStatsSnapshot};

use crate::constants::{MAX_CACHE_TTL_MS, SWEEPS_PER_EXPIRATION};
use crate::database::models::IdentityId;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Failure of a cache population. Cloned out to every caller that waited on the
/// same retrieval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("retrieval timed out after {0:?}")]
    TimedOut(Duration),
}

/// Values that reference an identity, so they can be invalidated when that identity
/// changes.
pub trait IdentityScoped {
    fn identity_id(&self) -> Option<IdentityId>;
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Used in logs and `/cachestats`.
    pub name: &'static str,
    /// Zero disables expiration and the sweeper.
    pub expiration: Duration,
    /// Upper bound on a single retrieval; `None` waits forever.
    pub retrieve_timeout: Option<Duration>,
}

impl CacheConfig {
    pub fn new(name: &'static str, expiration: Duration) -> Self {
        Self {
            name,
            expiration,
            retrieve_timeout: None,
        }
    }

    /// A zero timeout means no timeout.
    pub fn with_retrieve_timeout(mut self, timeout: Duration) -> Self {
        self.retrieve_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

type Retrieval<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

struct Entry<V> {
    value: V,
    retrieved_at: Option<Instant>,
}

/// A running retrieval. Invalidations that hit its key while it runs are recorded
/// here; the result still reaches its waiters but is not stored when it matches.
struct Flight<V> {
    id: u64,
    retrieval: Retrieval<V>,
    invalidated: bool,
    stale_identities: Vec<IdentityId>,
}

impl<V> Flight<V> {
    fn keeps(&self, value: &V, identity_of: Option<fn(&V) -> Option<IdentityId>>) -> bool {
        if self.invalidated {
            return false;
        }
        match (identity_of, self.stale_identities.is_empty()) {
            (Some(identity_of), false) => {
                identity_of(value).is_none_or(|id| !self.stale_identities.contains(&id))
            }
            _ => true,
        }
    }
}

struct State<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    in_flight: HashMap<CacheKey, Flight<V>>,
    next_flight: u64,
    /// Set by the first `remove_identity`, so settling can match in-flight values.
    identity_of: Option<fn(&V) -> Option<IdentityId>>,
}

struct Inner<V> {
    config: CacheConfig,
    state: RwLock<State<V>>,
    stats: CacheStats,
}

pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
    sweeper: Option<JoinHandle<()>>,
}

/// Interval between two sweeps for a given expiration.
pub fn sweep_period(expiration: Duration) -> Duration {
    (expiration / SWEEPS_PER_EXPIRATION).max(Duration::from_millis(1))
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn expires(&self) -> bool {
        !self.config.expiration.is_zero()
    }

    fn stamp(&self) -> Option<Instant> {
        self.expires().then(Instant::now)
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        match entry.retrieved_at {
            Some(at) if self.expires() => {
                now.saturating_duration_since(at) <= self.config.expiration
            }
            _ => true,
        }
    }

    fn lookup(&self, state: &State<V>, probes: &[CacheKey]) -> Option<V> {
        let now = Instant::now();
        probes
            .iter()
            .filter_map(|k| state.entries.get(k))
            .find(|e| self.is_live(e, now))
            .map(|e| e.value.clone())
    }

    async fn settle(&self, key: &CacheKey, flight: u64, outcome: &Result<V, CacheError>) {
        let mut state = self.state.write().await;
        let current = if state.in_flight.get(key).is_some_and(|f| f.id == flight) {
            state.in_flight.remove(key)
        } else {
            None
        };
        let identity_of = state.identity_of;
        match outcome {
            Ok(value) if current.as_ref().is_some_and(|f| f.keeps(value, identity_of)) => {
                let retrieved_at = self.stamp();
                state.entries.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        retrieved_at,
                    },
                );
            }
            Ok(_) => {
                debug!(target = "cache", cache = self.config.name, key = %key, "invalidated during retrieval; not stored");
            }
            Err(e) => {
                debug!(target = "cache", cache = self.config.name, key = %key, error = %e, "retrieval failed");
            }
        }
    }

    async fn sweep(&self) -> usize {
        if !self.expires() {
            return 0;
        }
        let expiration = self.config.expiration;
        let now = Instant::now();
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|_, e| {
            e.retrieved_at
                .is_none_or(|at| now.saturating_duration_since(at) <= expiration)
        });
        let evicted = before - state.entries.len();
        self.stats.record_evicted(evicted);
        evicted
    }
}

fn spawn_sweeper<V>(inner: Weak<Inner<V>>, period: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let evicted = inner.sweep().await;
            if evicted > 0 {
                trace!(target = "cache.sweep", cache = inner.config.name, evicted);
            }
        }
    })
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache and, when `expiration` is non-zero, starts its sweeper.
    /// Must be called from within a Tokio runtime in that case.
    pub fn new(name: &'static str, expiration: Duration) -> Self {
        Self::with_config(CacheConfig::new(name, expiration))
    }

    /// Expirations above `MAX_CACHE_TTL_MS` are clamped to it.
    pub fn with_config(mut config: CacheConfig) -> Self {
        config.expiration = config.expiration.min(Duration::from_millis(MAX_CACHE_TTL_MS));
        let expiration = config.expiration;
        let inner = Arc::new(Inner {
            config,
            state: RwLock::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_flight: 0,
                identity_of: None,
            }),
            stats: CacheStats::default(),
        });
        let sweeper = (!expiration.is_zero())
            .then(|| spawn_sweeper(Arc::downgrade(&inner), sweep_period(expiration)));
        Self { inner, sweeper }
    }

    pub fn name(&self) -> &'static str {
        self.inner.config.name
    }

    pub fn expiration(&self) -> Duration {
        self.inner.config.expiration
    }

    /// Returns the cached value for `key`, or runs `retrieve` to populate it.
    ///
    /// * `override_cache` skips the cached value (an in-flight retrieval is still
    ///   joined, its result is fresh by definition).
    /// * `attempt_numeric_key` looks the key up by its integer form when it parses
    ///   as one, so `"42"` and `42` share a slot.
    ///
    /// `retrieve` runs at most once per population no matter how many callers miss
    /// concurrently. Its error is returned to every waiter and nothing is cached.
    pub async fn get<K, F, Fut>(
        &self,
        key: K,
        retrieve: F,
        override_cache: bool,
        attempt_numeric_key: bool,
    ) -> Result<V, CacheError>
    where
        K: Into<CacheKey>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let original = key.into();
        let (slot, probes) = if attempt_numeric_key {
            let slot = original.clone().normalized();
            let mut probes = slot.aliases();
            if !probes.contains(&original) {
                probes.push(original);
            }
            (slot, probes)
        } else {
            (original.clone(), vec![original])
        };

        if !override_cache {
            let state = self.inner.state.read().await;
            if let Some(value) = self.inner.lookup(&state, &probes) {
                self.inner.stats.record_hit();
                trace!(target = "cache", cache = self.name(), key = %slot, hit = true);
                return Ok(value);
            }
        }

        let retrieval = {
            let mut state = self.inner.state.write().await;
            // Another task may have populated the slot while we waited for the lock.
            if !override_cache
                && let Some(value) = self.inner.lookup(&state, &probes)
            {
                self.inner.stats.record_hit();
                return Ok(value);
            }
            let existing = state.in_flight.get(&slot).map(|f| f.retrieval.clone());
            match existing {
                Some(retrieval) => {
                    self.inner.stats.record_coalesced();
                    debug!(target = "cache", cache = self.name(), key = %slot, "joining in-flight retrieval");
                    retrieval
                }
                None => {
                    self.inner.stats.record_miss();
                    trace!(target = "cache", cache = self.name(), key = %slot, hit = false, bypass = override_cache);
                    let id = state.next_flight;
                    state.next_flight += 1;
                    let retrieval = self.start_retrieval(slot.clone(), id, retrieve);
                    state.in_flight.insert(
                        slot,
                        Flight {
                            id,
                            retrieval: retrieval.clone(),
                            invalidated: false,
                            stale_identities: Vec::new(),
                        },
                    );
                    retrieval
                }
            }
        };
        retrieval.await
    }

    fn start_retrieval<F, Fut>(
        &self,
        key: CacheKey,
        flight: u64,
        retrieve: F,
    ) -> Retrieval<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        // Weak: the in-flight map inside `inner` holds this future.
        let inner = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.retrieve_timeout;
        async move {
            let outcome = match timeout {
                Some(limit) => tokio::time::timeout(limit, retrieve())
                    .await
                    .unwrap_or_else(|_| Err(CacheError::TimedOut(limit))),
                None => retrieve().await,
            };
            if let Some(inner) = inner.upgrade() {
                inner.settle(&key, flight, &outcome).await;
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Inserts or overwrites `key` verbatim (no numeric normalization).
    pub async fn put(&self, key: impl Into<CacheKey>, value: V) {
        let retrieved_at = self.inner.stamp();
        self.inner.state.write().await.entries.insert(
            key.into(),
            Entry {
                value,
                retrieved_at,
            },
        );
    }

    /// Removes `key` and, when it reads as an integer, both the numeric and the
    /// textual slot for that integer. Returns whether anything was removed.
    pub async fn remove(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into();
        let mut state = self.inner.state.write().await;
        let mut removed = false;
        for alias in key.aliases() {
            removed |= state.entries.remove(&alias).is_some();
            if let Some(flight) = state.in_flight.get_mut(&alias) {
                flight.invalidated = true;
            }
        }
        removed
    }

    pub async fn clear(&self) {
        let mut state = self.inner.state.write().await;
        state.entries.clear();
        for flight in state.in_flight.values_mut() {
            flight.invalidated = true;
        }
    }

    /// Runs one sweep immediately. Returns the number of evicted entries.
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    /// Number of stored entries, including expired ones not swept yet.
    pub async fn len(&self) -> usize {
        self.inner.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Stops the background sweeper. Lookups keep honouring the expiration.
    pub fn stop(&self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<V> TtlCache<V>
where
    V: IdentityScoped + Clone + Send + Sync + 'static,
{
    /// Drops every entry whose value references `identity`.
    pub async fn remove_identity(&self, identity: IdentityId) -> usize {
        let mut state = self.inner.state.write().await;
        state.identity_of = Some(V::identity_id);
        for flight in state.in_flight.values_mut() {
            flight.stale_identities.push(identity);
        }
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| e.value.identity_id() != Some(identity));
        before - state.entries.len()
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }
}

/// Type-erased handle for invalidating identity-scoped entries across caches with
/// different value types.
#[async_trait]
pub trait IdentityInvalidation: Send + Sync {
    fn cache_name(&self) -> &'static str;
    async fn invalidate_identity(&self, identity: IdentityId) -> usize;
}

#[async_trait]
impl<V> IdentityInvalidation for TtlCache<V>
where
    V: IdentityScoped + Clone + Send + Sync + 'static,
{
    fn cache_name(&self) -> &'static str {
        self.name()
    }

    async fn invalidate_identity(&self, identity: IdentityId) -> usize {
        self.remove_identity(identity).await
    }
}
