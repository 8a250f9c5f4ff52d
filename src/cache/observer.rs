use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use super::{
    error::QueryError,
    keys::QueryKey,
    query::{Query, QueryState},
    store::QueryCache,
};

/// An active view's subscription to one query.
///
/// While alive it counts as an observer, so invalidation refetches the key
/// immediately. Dropping it stops interval polling and releases the key;
/// results that land afterwards still update the shared cache but are never
/// delivered here.
pub struct QueryObserver<T> {
    cache: QueryCache,
    query: Query<T>,
    receiver: watch::Receiver<u64>,
    poller: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub(crate) fn new(
        cache: QueryCache,
        query: Query<T>,
        receiver: watch::Receiver<u64>,
        poller: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cache,
            query,
            receiver,
            poller,
        }
    }

    pub fn key(&self) -> &QueryKey {
        self.query.key()
    }

    /// Current state, starting a fetch if the entry went stale.
    pub fn state(&self) -> QueryState<T> {
        self.cache.read(&self.query)
    }

    /// Wait for the entry to settle or be invalidated.
    ///
    /// Returns `false` once the entry can no longer notify.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until the state is no longer loading.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.state();
            if !state.is_loading() {
                return state;
            }
            if !self.changed().await {
                return QueryState::Failed {
                    error: QueryError::Closed {
                        key: self.key().to_string(),
                    },
                    previous: state.data().cloned(),
                };
            }
        }
    }

    /// Wait for a settled value, surfacing the error state as `Err`.
    pub async fn ready(&mut self) -> Result<Arc<T>, QueryError> {
        match self.settled().await {
            QueryState::Ready(value) => Ok(value),
            QueryState::Failed { error, .. } => Err(error),
            QueryState::Loading { .. } => Err(QueryError::Closed {
                key: self.key().to_string(),
            }),
        }
    }

    pub fn refetch(&self) {
        self.cache.refetch(self.query.key());
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.cache.release(&self.query.key);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::cache::{CacheConfig, QueryOptions};

    fn cache() -> QueryCache {
        QueryCache::new(CacheConfig {
            retry_delay_ms: 0,
            ..CacheConfig::default()
        })
    }

    fn counting(key: &'static str, calls: Arc<AtomicUsize>) -> Query<usize> {
        Query::new(QueryKey::new(key), move || {
            let value = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(value) }
        })
    }

    #[tokio::test]
    async fn invalidation_refetches_observed_entries() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut observer = cache.observe(counting("donations", Arc::clone(&calls)));
        assert_eq!(*observer.ready().await.expect("first"), 1);

        cache.invalidate(&QueryKey::new("donations"));
        assert!(cache.is_fetching(observer.key()) || calls.load(Ordering::SeqCst) == 2);

        loop {
            assert!(observer.changed().await);
            if let QueryState::Ready(value) = observer.state()
                && *value == 2
            {
                break;
            }
        }
    }

    #[tokio::test]
    async fn unobserved_entries_wait_for_next_read() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let query = counting("events", Arc::clone(&calls));
        cache.fetch(&query).await.expect("first");

        cache.invalidate(&QueryKey::new("events"));
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_fetching(query.key()));
    }

    #[tokio::test]
    async fn mount_refetches_unless_disabled() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let query = counting("about", Arc::clone(&calls));
        cache.fetch(&query).await.expect("warm");

        let mut observer = cache.observe(query.clone());
        observer.changed().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        drop(observer);

        let quiet = query.with_options(QueryOptions {
            refetch_on_mount: false,
            ..QueryOptions::default()
        });
        let observer = cache.observe(quiet);
        assert!(matches!(observer.state(), QueryState::Ready(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drop_releases_the_key() {
        let cache = cache();
        let query = counting("blogs", Arc::new(AtomicUsize::new(0)));
        let observer = cache.observe(query.clone());
        let second = cache.observe(query.clone());
        assert_eq!(cache.observer_count(query.key()), 2);

        drop(observer);
        drop(second);
        assert_eq!(cache.observer_count(query.key()), 0);
    }

    #[tokio::test]
    async fn focus_respects_query_options() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let home = counting("home", Arc::clone(&calls))
            .with_options(QueryOptions::default().without_focus_refetch());
        let mut observer = cache.observe(home);
        observer.ready().await.expect("mounted");

        assert_eq!(cache.focus(), 0);

        let other_calls = Arc::new(AtomicUsize::new(0));
        let mut list = cache.observe(counting("list", Arc::clone(&other_calls)));
        list.ready().await.expect("mounted");
        assert_eq!(cache.focus(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_polls_while_observed() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let query = counting("dashboard-stats", Arc::clone(&calls))
            .with_options(QueryOptions::default().polling(Duration::from_secs(30)));
        let mut observer = cache.observe(query);
        observer.ready().await.expect("mounted");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        observer.changed().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(observer);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
