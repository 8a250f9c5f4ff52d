use happylife_types::Collection;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChangeFeed, ChangeFilter, ChangeNotice, RealtimeError};
use crate::cache::QueryCache;

/// Forwards change notices for one collection into cache invalidation.
///
/// Owned by a mounted view. Dropping it aborts the forwarding task, which
/// drops the subscription and closes the channel.
pub struct LiveInvalidation {
    channel: String,
    collection: Collection,
    task: JoinHandle<()>,
}

impl LiveInvalidation {
    pub async fn open(
        feed: &dyn ChangeFeed,
        cache: QueryCache,
        channel: &str,
        collection: Collection,
    ) -> Result<Self, RealtimeError> {
        let mut subscription = feed.subscribe(channel, ChangeFilter::table(collection)).await?;
        let name = channel.to_string();

        let task = tokio::spawn(async move {
            while let Some(notice) = subscription.next().await {
                match &notice {
                    ChangeNotice::Change(event) => {
                        debug!(
                            channel = %name,
                            table = %event.table,
                            kind = %event.kind,
                            "Change received"
                        );
                    }
                    ChangeNotice::Resync => {
                        warn!(channel = %name, "Change stream resynced, invalidating");
                    }
                }
                counter!("happylife_realtime_invalidation_total").increment(1);
                cache.invalidate_collection(collection);
            }
            info!(channel = %name, "Change stream ended");
        });

        Ok(Self {
            channel: channel.to_string(),
            collection,
            task,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }
}

impl Drop for LiveInvalidation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        cache::{CacheConfig, Query, QueryKey, QueryState},
        realtime::{ChangeEvent, ChangeKind, LocalChangeFeed},
    };

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }

    #[tokio::test]
    async fn change_events_invalidate_collection_keys() {
        let feed = LocalChangeFeed::default();
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let query = Query::new(QueryKey::new("blogs").with("all"), move || {
            let value = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        })
        .reads(Collection::Blogs);
        cache.fetch(&query).await.expect("warm");

        let _live =
            LiveInvalidation::open(&feed, cache.clone(), "blogs-realtime-list", Collection::Blogs)
                .await
                .expect("subscribe");
        feed.publish(ChangeEvent::new(ChangeKind::Insert, Collection::Blogs));

        wait_until(|| cache.read(&query).is_loading() || calls.load(Ordering::SeqCst) > 1).await;
        assert_eq!(*cache.fetch(&query).await.expect("refetched"), 1);
    }

    #[tokio::test]
    async fn dropping_bridge_closes_subscription() {
        let feed = LocalChangeFeed::default();
        let cache = QueryCache::new(CacheConfig::default());
        let live = LiveInvalidation::open(&feed, cache, "events-home", Collection::Events)
            .await
            .expect("subscribe");
        assert_eq!(feed.active_channels(), 1);

        drop(live);
        wait_until(|| feed.active_channels() == 0).await;
    }

    #[tokio::test]
    async fn other_tables_leave_cache_untouched() {
        let feed = LocalChangeFeed::default();
        let cache = QueryCache::new(CacheConfig::default());
        let query: Query<u8> =
            Query::new(QueryKey::new("about"), || async { Ok(1) }).reads(Collection::About);
        cache.fetch(&query).await.expect("warm");

        let _live =
            LiveInvalidation::open(&feed, cache.clone(), "blogs-realtime-home", Collection::Blogs)
                .await
                .expect("subscribe");
        feed.publish(ChangeEvent::new(ChangeKind::Delete, Collection::About));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(cache.read(&query), QueryState::Ready(_)));
    }
}
