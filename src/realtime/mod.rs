//! Realtime change notifications and the cache invalidation bridge.
//!
//! A [`ChangeFeed`] hands out per-view [`Subscription`]s filtered by table.
//! Dropping a subscription releases its channel. [`LiveInvalidation`]
//! forwards every notice on a subscription to the query cache as a coarse
//! collection-wide invalidation.

mod bridge;
mod local;
mod postgres;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use happylife_types::Collection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bridge::LiveInvalidation;
pub use local::LocalChangeFeed;
pub use postgres::{NOTIFY_CHANNEL, PgChangeFeed, install_triggers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        })
    }
}

impl FromStr for ChangeKind {
    type Err = RealtimeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(RealtimeError::payload(format!("unknown change kind `{other}`"))),
        }
    }
}

/// A row changed in a backend table. No payload diff is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: Collection,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, table: Collection) -> Self {
        Self {
            kind,
            schema: DEFAULT_SCHEMA.to_string(),
            table,
        }
    }
}

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Only(ChangeKind),
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: Collection,
    pub event: EventFilter,
}

impl ChangeFilter {
    /// Every event on `table` in the public schema.
    pub fn table(table: Collection) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table,
            event: EventFilter::All,
        }
    }

    pub fn only(mut self, kind: ChangeKind) -> Self {
        self.event = EventFilter::Only(kind);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && event.schema == self.schema
            && match self.event {
                EventFilter::All => true,
                EventFilter::Only(kind) => kind == event.kind,
            }
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    Change(ChangeEvent),
    /// Events may have been missed (lag or reconnect); treat as a change.
    Resync,
}

/// An open realtime channel. Dropping it closes the channel.
pub struct Subscription {
    channel: String,
    filter: ChangeFilter,
    notices: BoxStream<'static, ChangeNotice>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        filter: ChangeFilter,
        notices: BoxStream<'static, ChangeNotice>,
    ) -> Self {
        Self {
            channel: channel.into(),
            filter,
            notices,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Next notice, or `None` once the feed has shut down.
    pub async fn next(&mut self) -> Option<ChangeNotice> {
        self.notices.next().await
    }
}

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("realtime database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to install realtime triggers: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid change notification: {message}")]
    Payload { message: String },
}

impl RealtimeError {
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }
}

/// Source of per-table change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, RealtimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_table_and_kind() {
        let insert = ChangeEvent::new(ChangeKind::Insert, Collection::Blogs);
        let delete = ChangeEvent::new(ChangeKind::Delete, Collection::Blogs);
        let other = ChangeEvent::new(ChangeKind::Insert, Collection::Events);

        let all = ChangeFilter::table(Collection::Blogs);
        assert!(all.matches(&insert));
        assert!(all.matches(&delete));
        assert!(!all.matches(&other));

        let inserts = ChangeFilter::table(Collection::Blogs).only(ChangeKind::Insert);
        assert!(inserts.matches(&insert));
        assert!(!inserts.matches(&delete));
    }

    #[test]
    fn change_kinds_parse_trigger_operations() {
        assert_eq!("insert".parse::<ChangeKind>().ok(), Some(ChangeKind::Insert));
        assert_eq!("UPDATE".parse::<ChangeKind>().ok(), Some(ChangeKind::Update));
        assert!("TRUNCATE".parse::<ChangeKind>().is_err());
    }
}
