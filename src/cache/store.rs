//! The query cache.
//!
//! Entries are type-erased and keyed by [`QueryKey`]. Each entry carries a
//! generation counter: invalidation bumps it, and a fetch remembers the
//! generation it started at. A value counts as fresh only when the last
//! settled fetch started at the current generation, so a result that raced
//! an invalidation is kept for display but never served as fresh.

use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use happylife_types::Collection;
use lru::LruCache;
use metrics::{counter, histogram};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    config::CacheConfig,
    error::QueryError,
    keys::QueryKey,
    lock::mutex_lock,
    observer::QueryObserver,
    query::{AnyValue, Fetcher, Query, QueryOptions, QueryState},
    registry::CollectionRegistry,
};

const TARGET: &str = "happylife::cache::store";

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

#[derive(Clone)]
struct FetchOutcome {
    fetch_id: u64,
    generation: u64,
    result: Result<AnyValue, QueryError>,
}

struct InFlight {
    fetch_id: u64,
    future: SharedFetch,
}

struct Settled {
    generation: u64,
    at: Instant,
}

struct Entry {
    value: Option<AnyValue>,
    error: Option<QueryError>,
    settled: Option<Settled>,
    generation: u64,
    in_flight: Option<InFlight>,
    observers: usize,
    fetcher: Fetcher,
    options: QueryOptions,
    notify: watch::Sender<u64>,
}

impl Entry {
    fn new(fetcher: Fetcher, options: QueryOptions) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            value: None,
            error: None,
            settled: None,
            generation: 0,
            in_flight: None,
            observers: 0,
            fetcher,
            options,
            notify,
        }
    }

    fn is_fresh(&self) -> bool {
        match &self.settled {
            Some(settled) if settled.generation == self.generation => self
                .options
                .stale_after
                .is_none_or(|age| settled.at.elapsed() < age),
            _ => false,
        }
    }

    fn evictable(&self) -> bool {
        self.observers == 0 && self.in_flight.is_none()
    }

    fn bump(&self) {
        self.notify.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        let previous = match self.value.as_ref().map(|value| downcast::<T>(value, key)) {
            Some(Ok(value)) => Some(value),
            Some(Err(error)) => return QueryState::Failed { error, previous: None },
            None => None,
        };

        if !self.is_fresh() {
            return QueryState::Loading { previous };
        }
        match (&self.error, previous) {
            (Some(error), previous) => QueryState::Failed {
                error: error.clone(),
                previous,
            },
            (None, Some(value)) => QueryState::Ready(value),
            (None, None) => QueryState::Loading { previous: None },
        }
    }
}

fn downcast<T: Send + Sync + 'static>(
    value: &AnyValue,
    key: &QueryKey,
) -> Result<Arc<T>, QueryError> {
    Arc::clone(value)
        .downcast::<T>()
        .map_err(|_| QueryError::TypeMismatch {
            key: key.to_string(),
        })
}

struct Inner {
    entries: Mutex<LruCache<QueryKey, Entry>>,
    registry: CollectionRegistry,
    config: CacheConfig,
    next_fetch: AtomicU64,
}

/// Shared, cloneable handle to the query cache.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(LruCache::unbounded()),
                registry: CollectionRegistry::new(),
                config,
                next_fetch: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Base options for queries built against this cache.
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions::from(&self.inner.config)
    }

    /// Return the cached state, starting a fetch when the entry is missing or stale.
    ///
    /// Never blocks on the backend: a stale entry reports `Loading` with the
    /// previous value while a single shared fetch runs in the background.
    pub fn read<T: Send + Sync + 'static>(&self, query: &Query<T>) -> QueryState<T> {
        let mut entries = mutex_lock(&self.inner.entries, TARGET, "read");
        let entry = self.inner.upsert(&mut entries, query);

        if entry.is_fresh() {
            counter!("happylife_query_cache_hit_total").increment(1);
            debug!(key = %query.key, "Query cache hit");
        } else {
            counter!("happylife_query_cache_miss_total").increment(1);
            debug!(key = %query.key, "Query cache miss");
            start_fetch(&self.inner, &query.key, entry);
        }
        entry.state(&query.key)
    }

    /// Resolve the query, awaiting the shared in-flight fetch if needed.
    ///
    /// The returned value is at least as fresh as the last invalidation that
    /// happened before this call.
    pub async fn fetch<T: Send + Sync + 'static>(
        &self,
        query: &Query<T>,
    ) -> Result<Arc<T>, QueryError> {
        loop {
            let (target, pending) = {
                let mut entries = mutex_lock(&self.inner.entries, TARGET, "fetch");
                let entry = self.inner.upsert(&mut entries, query);
                if entry.is_fresh() {
                    counter!("happylife_query_cache_hit_total").increment(1);
                    return match entry.state(&query.key) {
                        QueryState::Ready(value) => Ok(value),
                        QueryState::Failed { error, .. } => Err(error),
                        QueryState::Loading { .. } => Err(QueryError::Closed {
                            key: query.key.to_string(),
                        }),
                    };
                }
                counter!("happylife_query_cache_miss_total").increment(1);
                (entry.generation, pending_fetch(&self.inner, &query.key, entry))
            };

            let outcome = pending.await;
            complete(&self.inner, &query.key, outcome.clone());
            if outcome.generation >= target {
                return outcome
                    .result
                    .and_then(|value| downcast::<T>(&value, &query.key));
            }
            debug!(
                key = %query.key,
                generation = outcome.generation,
                target,
                "Discarding outdated fetch result"
            );
        }
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Observed entries refetch immediately; others refetch on next read.
    /// Returns the number of entries touched.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = mutex_lock(&self.inner.entries, TARGET, "invalidate");
        let mut touched = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                mark_stale(&self.inner, key, entry);
                touched += 1;
            }
        }
        info!(prefix = %prefix, touched, "Invalidated queries");
        touched
    }

    /// Invalidate every cached query that reads `collection`.
    pub fn invalidate_collection(&self, collection: Collection) -> usize {
        let keys = self.inner.registry.keys_for(collection);
        let mut entries = mutex_lock(&self.inner.entries, TARGET, "invalidate_collection");
        let mut touched = 0;
        for key in &keys {
            if let Some(entry) = entries.peek_mut(key) {
                mark_stale(&self.inner, key, entry);
                touched += 1;
            }
        }
        info!(collection = %collection, touched, "Invalidated collection queries");
        touched
    }

    /// Start a fetch for `key` if none is running, regardless of freshness.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        refetch_key(&self.inner, key)
    }

    /// Window refocus: refetch observed queries that allow it.
    pub fn focus(&self) -> usize {
        let mut entries = mutex_lock(&self.inner.entries, TARGET, "focus");
        let mut started = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.observers > 0 && entry.options.refetch_on_focus {
                start_fetch(&self.inner, key, entry);
                started += 1;
            }
        }
        debug!(started, "Refetched observed queries on focus");
        started
    }

    /// Mount an observer for `query`.
    pub fn observe<T: Send + Sync + 'static>(&self, query: Query<T>) -> QueryObserver<T> {
        let receiver = {
            let mut entries = mutex_lock(&self.inner.entries, TARGET, "observe");
            let entry = self.inner.upsert(&mut entries, &query);
            entry.observers += 1;
            if entry.options.refetch_on_mount || !entry.is_fresh() {
                start_fetch(&self.inner, &query.key, entry);
            }
            entry.notify.subscribe()
        };

        let poller = query
            .options
            .refetch_interval
            .map(|every| spawn_poller(Arc::downgrade(&self.inner), query.key.clone(), every));

        QueryObserver::new(self.clone(), query, receiver, poller)
    }

    pub(crate) fn release(&self, key: &QueryKey) {
        let mut entries = mutex_lock(&self.inner.entries, TARGET, "release");
        if let Some(entry) = entries.peek_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.inner.entries, TARGET, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.entries, TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.inner.entries, TARGET, "observer_count")
            .peek(key)
            .map_or(0, |entry| entry.observers)
    }

    /// True while a fetch for `key` is running.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.inner.entries, TARGET, "is_fetching")
            .peek(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }
}

impl Inner {
    fn upsert<'a, T>(
        &self,
        entries: &'a mut LruCache<QueryKey, Entry>,
        query: &Query<T>,
    ) -> &'a mut Entry {
        let inserting = !entries.contains(&query.key);
        if inserting {
            self.evict_overflow(entries);
            self.registry
                .register(query.key.clone(), query.collections.iter().copied());
        }

        let entry = entries.get_or_insert_mut(query.key.clone(), || {
            Entry::new(Arc::clone(&query.fetcher), query.options.clone())
        });
        if !inserting {
            entry.fetcher = Arc::clone(&query.fetcher);
            entry.options = query.options.clone();
        }
        entry
    }

    fn evict_overflow(&self, entries: &mut LruCache<QueryKey, Entry>) {
        let limit = self.config.max_entries_non_zero().get();
        while entries.len() >= limit {
            let victim = entries
                .iter()
                .rev()
                .find(|(_, entry)| entry.evictable())
                .map(|(key, _)| key.clone());
            let Some(key) = victim else {
                break;
            };
            entries.pop(&key);
            let collections = self.registry.collections_for(&key);
            self.registry.unregister(&key);
            counter!("happylife_query_cache_evict_total").increment(1);
            debug!(key = %key, ?collections, "Evicted query cache entry");
        }
    }
}

fn mark_stale(inner: &Arc<Inner>, key: &QueryKey, entry: &mut Entry) {
    entry.generation += 1;
    if entry.observers > 0 && entry.in_flight.is_none() {
        start_fetch(inner, key, entry);
    }
    entry.bump();
}

fn refetch_key(inner: &Arc<Inner>, key: &QueryKey) -> bool {
    let mut entries = mutex_lock(&inner.entries, TARGET, "refetch");
    match entries.peek_mut(key) {
        Some(entry) => {
            start_fetch(inner, key, entry);
            true
        }
        None => false,
    }
}

/// Start a fetch for `entry` unless one is already in flight.
fn start_fetch(inner: &Arc<Inner>, key: &QueryKey, entry: &mut Entry) {
    if entry.in_flight.is_none() {
        entry.in_flight = Some(spawn_fetch(inner, key, entry));
    }
}

/// The running fetch for `entry`, starting one if none is in flight.
fn pending_fetch(inner: &Arc<Inner>, key: &QueryKey, entry: &mut Entry) -> SharedFetch {
    if let Some(in_flight) = &entry.in_flight {
        return in_flight.future.clone();
    }
    let in_flight = spawn_fetch(inner, key, entry);
    let future = in_flight.future.clone();
    entry.in_flight = Some(in_flight);
    future
}

fn spawn_fetch(inner: &Arc<Inner>, key: &QueryKey, entry: &Entry) -> InFlight {
    let fetch_id = inner.next_fetch.fetch_add(1, Ordering::Relaxed);
    let generation = entry.generation;
    let future = run_fetch(
        key.clone(),
        Arc::clone(&entry.fetcher),
        entry.options.retry,
        entry.options.retry_delay,
        fetch_id,
        generation,
    )
    .boxed()
    .shared();

    counter!("happylife_query_cache_fetch_total").increment(1);
    debug!(key = %key, fetch_id, generation, "Started query fetch");

    let driver = future.clone();
    let weak = Arc::downgrade(inner);
    let key = key.clone();
    tokio::spawn(async move {
        let outcome = driver.await;
        if let Some(inner) = weak.upgrade() {
            complete(&inner, &key, outcome);
        }
    });

    InFlight { fetch_id, future }
}

/// Settle a fetch into its entry. Idempotent per fetch id: both the driver
/// task and awaiting readers call it.
fn complete(inner: &Arc<Inner>, key: &QueryKey, outcome: FetchOutcome) {
    let mut entries = mutex_lock(&inner.entries, TARGET, "complete");
    let Some(entry) = entries.peek_mut(key) else {
        return;
    };
    if !matches!(&entry.in_flight, Some(in_flight) if in_flight.fetch_id == outcome.fetch_id) {
        return;
    }

    entry.in_flight = None;
    match outcome.result {
        Ok(value) => {
            entry.value = Some(value);
            entry.error = None;
        }
        Err(error) => entry.error = Some(error),
    }
    entry.settled = Some(Settled {
        generation: outcome.generation,
        at: Instant::now(),
    });

    if outcome.generation < entry.generation && entry.observers > 0 {
        start_fetch(inner, key, entry);
    }
    entry.bump();
}

async fn run_fetch(
    key: QueryKey,
    fetcher: Fetcher,
    retry: u32,
    retry_delay: Duration,
    fetch_id: u64,
    generation: u64,
) -> FetchOutcome {
    let started = Instant::now();
    let mut attempt = 0;
    let result = loop {
        match fetcher().await {
            Ok(value) => break Ok(value),
            Err(error) if error.is_retryable() && attempt < retry => {
                attempt += 1;
                counter!("happylife_query_cache_retry_total").increment(1);
                warn!(key = %key, attempt, error = %error, "Query fetch failed, retrying");
                tokio::time::sleep(retry_delay).await;
            }
            Err(error) => {
                warn!(key = %key, attempts = attempt + 1, error = %error, "Query fetch failed");
                break Err(QueryError::from(error));
            }
        }
    };

    histogram!("happylife_query_cache_fetch_ms")
        .record(started.elapsed().as_secs_f64() * 1000.0);
    FetchOutcome {
        fetch_id,
        generation,
        result,
    }
}

fn spawn_poller(inner: Weak<Inner>, key: QueryKey, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            debug!(key = %key, "Polling query");
            refetch_key(&inner, &key);
        }
    })
}
