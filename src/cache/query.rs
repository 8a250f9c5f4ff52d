//! Query descriptions: key, collections read, fetch policy and fetcher.

use std::{any::Any, fmt, future::Future, marker::PhantomData, sync::Arc, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use happylife_types::Collection;

use super::{config::CacheConfig, error::QueryError, keys::QueryKey};
use crate::gateway::GatewayError;

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;
pub(crate) type Fetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<AnyValue, GatewayError>> + Send + Sync>;

/// Per-query fetch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Refetch whenever a new observer mounts, even if the value is fresh.
    pub refetch_on_mount: bool,
    /// Refetch observed entries on [`QueryCache::focus`](super::QueryCache::focus).
    pub refetch_on_focus: bool,
    /// Age after which a settled value counts as stale. `None` means never by age.
    pub stale_after: Option<Duration>,
    /// Poll observed entries at this cadence.
    pub refetch_interval: Option<Duration>,
    /// Automatic retries for retryable failures.
    pub retry: u32,
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for QueryOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            refetch_on_mount: true,
            refetch_on_focus: config.refetch_on_focus,
            stale_after: None,
            refetch_interval: None,
            retry: config.retry,
            retry_delay: config.retry_delay(),
        }
    }
}

impl QueryOptions {
    pub fn without_focus_refetch(mut self) -> Self {
        self.refetch_on_focus = false;
        self
    }

    pub fn polling(mut self, every: Duration) -> Self {
        self.refetch_interval = Some(every);
        self
    }

    pub fn stale_after(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }
}

/// A typed, cacheable query.
pub struct Query<T> {
    pub(crate) key: QueryKey,
    pub(crate) collections: Vec<Collection>,
    pub(crate) options: QueryOptions,
    pub(crate) fetcher: Fetcher,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            collections: self.collections.clone(),
            options: self.options.clone(),
            fetcher: Arc::clone(&self.fetcher),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("collections", &self.collections)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || {
            let pending = fetch();
            async move { pending.await.map(|value| Arc::new(value) as AnyValue) }.boxed()
        });

        Self {
            key,
            collections: Vec::new(),
            options: QueryOptions::default(),
            fetcher,
            _marker: PhantomData,
        }
    }

    /// Declare a collection this query reads; realtime changes to it invalidate the key.
    pub fn reads(mut self, collection: Collection) -> Self {
        if !self.collections.contains(&collection) {
            self.collections.push(collection);
        }
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

/// What a view sees when it reads a query.
#[derive(Debug)]
pub enum QueryState<T> {
    /// A fetch is running; `previous` is the last settled value, if any.
    Loading { previous: Option<Arc<T>> },
    Ready(Arc<T>),
    /// Every attempt failed; the last good value is kept for display.
    Failed {
        error: QueryError,
        previous: Option<Arc<T>>,
    },
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Loading { previous } => Self::Loading {
                previous: previous.clone(),
            },
            Self::Ready(value) => Self::Ready(Arc::clone(value)),
            Self::Failed { error, previous } => Self::Failed {
                error: error.clone(),
                previous: previous.clone(),
            },
        }
    }
}

impl<T> QueryState<T> {
    /// Best value to render: the ready value or the previous one.
    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Loading { previous } | Self::Failed { previous, .. } => previous.as_ref(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}
