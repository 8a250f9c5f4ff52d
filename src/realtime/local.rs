use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, stream};
use metrics::gauge;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeNotice, RealtimeError, Subscription};

const DEFAULT_CAPACITY: usize = 256;

/// In-process change hub backed by a `tokio::sync::broadcast` channel.
#[derive(Clone)]
pub struct LocalChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    channels: Arc<DashMap<String, usize>>,
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Deliver an event to every open subscription. Returns the receiver count.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!(table = %event.table, kind = %event.kind, "Publishing change event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of open subscriptions across all channels.
    pub fn active_channels(&self) -> usize {
        self.channels.iter().map(|entry| *entry.value()).sum()
    }

    pub fn is_open(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }
}

/// Counts a subscription as open until dropped.
struct ChannelGuard {
    channel: String,
    channels: Arc<DashMap<String, usize>>,
}

impl ChannelGuard {
    fn open(channel: &str, channels: &Arc<DashMap<String, usize>>) -> Self {
        *channels.entry(channel.to_string()).or_insert(0) += 1;
        gauge!("happylife_realtime_active_channels").increment(1.0);
        Self {
            channel: channel.to_string(),
            channels: Arc::clone(channels),
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.channels.get_mut(&self.channel) {
            *count = count.saturating_sub(1);
        }
        self.channels.remove_if(&self.channel, |_, count| *count == 0);
        gauge!("happylife_realtime_active_channels").decrement(1.0);
        debug!(channel = %self.channel, "Closed realtime subscription");
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, RealtimeError> {
        let receiver = self.sender.subscribe();
        let guard = ChannelGuard::open(channel, &self.channels);
        debug!(channel, table = %filter.table, "Opened realtime subscription");

        let matcher = filter.clone();
        let notices = stream::unfold(
            (receiver, matcher, guard),
            |(mut receiver, matcher, guard)| async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) if matcher.matches(&event) => {
                            return Some((ChangeNotice::Change(event), (receiver, matcher, guard)));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(channel = %guard.channel, skipped, "Realtime subscriber lagged");
                            return Some((ChangeNotice::Resync, (receiver, matcher, guard)));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        )
        .boxed();

        Ok(Subscription::new(channel, filter, notices))
    }
}

#[cfg(test)]
mod tests {
    use happylife_types::Collection;

    use super::*;
    use crate::realtime::ChangeKind;

    #[tokio::test]
    async fn subscribers_receive_matching_events_only() {
        let feed = LocalChangeFeed::default();
        let mut blogs = feed
            .subscribe("blogs-realtime-list", ChangeFilter::table(Collection::Blogs))
            .await
            .expect("subscribe");

        feed.publish(ChangeEvent::new(ChangeKind::Insert, Collection::Events));
        feed.publish(ChangeEvent::new(ChangeKind::Update, Collection::Blogs));

        assert_eq!(
            blogs.next().await,
            Some(ChangeNotice::Change(ChangeEvent::new(
                ChangeKind::Update,
                Collection::Blogs
            )))
        );
    }

    #[tokio::test]
    async fn dropping_subscription_releases_channel() {
        let feed = LocalChangeFeed::default();
        let first = feed
            .subscribe("events-home", ChangeFilter::table(Collection::Events))
            .await
            .expect("subscribe");
        let second = feed
            .subscribe("events-home", ChangeFilter::table(Collection::Events))
            .await
            .expect("subscribe");
        assert_eq!(feed.active_channels(), 2);
        assert!(feed.is_open("events-home"));

        drop(first);
        assert_eq!(feed.active_channels(), 1);
        drop(second);
        assert_eq!(feed.active_channels(), 0);
        assert!(!feed.is_open("events-home"));
    }

    #[tokio::test]
    async fn lag_surfaces_as_resync() {
        let feed = LocalChangeFeed::new(1);
        let mut subscription = feed
            .subscribe("donations-realtime-list", ChangeFilter::table(Collection::Donations))
            .await
            .expect("subscribe");

        for _ in 0..3 {
            feed.publish(ChangeEvent::new(ChangeKind::Insert, Collection::Donations));
        }
        assert_eq!(subscription.next().await, Some(ChangeNotice::Resync));
    }
}
