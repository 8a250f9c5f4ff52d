use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use happylife_types::Collection;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPoolOptions};
use tracing::{info, warn};

use super::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeNotice, RealtimeError, Subscription};

/// Notification channel the bundled trigger publishes on.
pub const NOTIFY_CHANNEL: &str = "happylife_changes";

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct TriggerPayload {
    event: String,
    schema: String,
    table: String,
}

pub(crate) fn parse_payload(payload: &str) -> Result<ChangeEvent, RealtimeError> {
    let raw: TriggerPayload = serde_json::from_str(payload)
        .map_err(|err| RealtimeError::payload(format!("malformed notification: {err}")))?;
    let table = Collection::from_table(&raw.table)
        .ok_or_else(|| RealtimeError::payload(format!("unknown table `{}`", raw.table)))?;
    Ok(ChangeEvent {
        kind: raw.event.parse()?,
        schema: raw.schema,
        table,
    })
}

/// Change feed over PostgreSQL `LISTEN/NOTIFY`.
///
/// Each subscription owns a dedicated listener connection, closed when the
/// subscription is dropped.
#[derive(Debug, Clone)]
pub struct PgChangeFeed {
    database_url: String,
}

impl PgChangeFeed {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(
        &self,
        channel: &str,
        filter: ChangeFilter,
    ) -> Result<Subscription, RealtimeError> {
        let mut listener = PgListener::connect(&self.database_url).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        info!(channel, table = %filter.table, "Opened realtime subscription");

        let matcher = filter.clone();
        let name = channel.to_string();
        let notices = stream::unfold(
            (listener, matcher, name),
            |(mut listener, matcher, name)| async move {
                let notice = next_notice(&mut listener, &matcher, &name).await;
                Some((notice, (listener, matcher, name)))
            },
        )
        .boxed();

        Ok(Subscription::new(channel, filter, notices))
    }
}

/// Raw notification payloads off a listener connection.
///
/// `Ok(None)` means the connection dropped; the next call reconnects.
#[async_trait]
trait NotificationSource: Send {
    async fn receive(&mut self) -> Result<Option<String>, sqlx::Error>;
}

#[async_trait]
impl NotificationSource for PgListener {
    async fn receive(&mut self) -> Result<Option<String>, sqlx::Error> {
        let notification = self.try_recv().await?;
        Ok(notification.map(|notification| notification.payload().to_string()))
    }
}

/// Wait for the next notice. Anything that may have lost notifications
/// (a dropped connection or a receive error) yields `Resync`.
async fn next_notice<S: NotificationSource>(
    source: &mut S,
    matcher: &ChangeFilter,
    name: &str,
) -> ChangeNotice {
    loop {
        match source.receive().await {
            Ok(Some(payload)) => match parse_payload(&payload) {
                Ok(event) if matcher.matches(&event) => return ChangeNotice::Change(event),
                Ok(_) => continue,
                Err(err) => warn!(channel = name, error = %err, "Ignoring change notification"),
            },
            Ok(None) => {
                warn!(channel = name, "Realtime connection lost, resyncing");
                return ChangeNotice::Resync;
            }
            Err(err) => {
                warn!(channel = name, error = %err, "Realtime listener interrupted, resyncing");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                return ChangeNotice::Resync;
            }
        }
    }
}

/// Install the change-notification trigger on every site table.
pub async fn install_triggers(database_url: &str) -> Result<(), RealtimeError> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    pool.close().await;
    info!(channel = NOTIFY_CHANNEL, "Installed realtime triggers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::realtime::ChangeKind;

    struct Scripted(VecDeque<Result<Option<String>, sqlx::Error>>);

    #[async_trait]
    impl NotificationSource for Scripted {
        async fn receive(&mut self) -> Result<Option<String>, sqlx::Error> {
            self.0.pop_front().unwrap_or(Err(sqlx::Error::PoolClosed))
        }
    }

    fn notification(table: &str) -> Result<Option<String>, sqlx::Error> {
        Ok(Some(format!(
            r#"{{"event":"UPDATE","schema":"public","table":"{table}"}}"#
        )))
    }

    #[tokio::test]
    async fn dropped_connection_resyncs_then_resumes() {
        let mut source = Scripted(VecDeque::from([
            notification("events"),
            Ok(None),
            notification("blogs"),
        ]));
        let filter = ChangeFilter::table(Collection::Blogs);

        assert_eq!(
            next_notice(&mut source, &filter, "blogs-realtime-list").await,
            ChangeNotice::Resync
        );
        assert_eq!(
            next_notice(&mut source, &filter, "blogs-realtime-list").await,
            ChangeNotice::Change(ChangeEvent::new(ChangeKind::Update, Collection::Blogs))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn receive_errors_resync_after_backoff() {
        let mut source = Scripted(VecDeque::from([
            Ok(Some("not json".to_string())),
            Err(sqlx::Error::PoolClosed),
        ]));
        let filter = ChangeFilter::table(Collection::Events);

        let started = tokio::time::Instant::now();
        assert_eq!(
            next_notice(&mut source, &filter, "events-home").await,
            ChangeNotice::Resync
        );
        assert!(started.elapsed() >= RECONNECT_BACKOFF);
    }

    #[test]
    fn trigger_payload_parses_into_event() {
        let payload = r#"{"event":"INSERT","schema":"public","table":"contact_messages"}"#;
        let event = parse_payload(payload).expect("valid payload");
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.table, Collection::Messages);
        assert_eq!(event.schema, "public");
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert!(matches!(
            parse_payload(r#"{"event":"DELETE","schema":"public","table":"users"}"#),
            Err(RealtimeError::Payload { .. })
        ));
        assert!(parse_payload("not json").is_err());
    }
}
