//! In-process gateway used for offline mode and tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use happylife_types::{Collection, Record};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};
use uuid::Uuid;

use super::{FetchSpec, Filter, GatewayError, RemoteGateway, StoredObject};
use crate::{
    cache::lock::mutex_lock,
    realtime::{ChangeEvent, ChangeKind, LocalChangeFeed},
    session::SessionContext,
};

const TARGET: &str = "happylife::gateway::memory";

/// Backend double holding rows as JSON.
///
/// Writes follow the backend's access rules (a session is required except
/// for public contact messages) and publish change events to an attached
/// [`LocalChangeFeed`].
pub struct MemoryGateway {
    tables: DashMap<Collection, Vec<Value>>,
    objects: DashMap<String, StoredObject>,
    session: SessionContext,
    feed: Option<LocalChangeFeed>,
    faults: Mutex<VecDeque<(Collection, GatewayError)>>,
    fetches: DashMap<Collection, usize>,
    latency: Option<Duration>,
    clock: AtomicI64,
}

impl MemoryGateway {
    pub fn new(session: SessionContext) -> Self {
        Self {
            tables: DashMap::new(),
            objects: DashMap::new(),
            session,
            feed: None,
            faults: Mutex::new(VecDeque::new()),
            fetches: DashMap::new(),
            latency: None,
            clock: AtomicI64::new(0),
        }
    }

    pub fn with_feed(mut self, feed: LocalChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Delay every call, to exercise loading states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Load raw rows without auth checks or change events.
    pub fn seed(&self, collection: Collection, rows: impl IntoIterator<Item = Value>) {
        self.tables.entry(collection).or_default().extend(rows);
    }

    pub fn seed_records<T: Record>(
        &self,
        records: impl IntoIterator<Item = T>,
    ) -> Result<(), GatewayError> {
        let rows = records
            .into_iter()
            .map(|record| serde_json::to_value(&record))
            .collect::<Result<Vec<_>, _>>()?;
        self.seed(T::COLLECTION, rows);
        Ok(())
    }

    /// Fail the next call touching `collection` with `error`.
    pub fn fail_next(&self, collection: Collection, error: GatewayError) {
        mutex_lock(&self.faults, TARGET, "fail_next").push_back((collection, error));
    }

    /// Reads served for `collection` so far, counts included.
    pub fn fetch_count(&self, collection: Collection) -> usize {
        self.fetches.get(&collection).map_or(0, |count| *count)
    }

    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.tables
            .get(&collection)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn object(&self, url: &str) -> Option<StoredObject> {
        self.objects.get(url).map(|object| object.clone())
    }

    async fn enter(&self, collection: Collection) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut faults = mutex_lock(&self.faults, TARGET, "enter");
        match faults.iter().position(|(target, _)| *target == collection) {
            Some(index) => match faults.remove(index) {
                Some((_, error)) => Err(error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn record_fetch(&self, collection: Collection) {
        *self.fetches.entry(collection).or_insert(0) += 1;
    }

    fn authorize(&self, collection: Collection, kind: ChangeKind) -> Result<(), GatewayError> {
        let public = kind == ChangeKind::Insert && collection.accepts_public_inserts();
        if public || self.session.is_signed_in() {
            Ok(())
        } else {
            Err(GatewayError::authorization(format!(
                "new row violates row-level security policy for table \"{}\"",
                collection.table()
            )))
        }
    }

    /// Strictly increasing wall-clock timestamps, so creation order is total.
    fn timestamp(&self) -> Result<String, GatewayError> {
        let wall = OffsetDateTime::now_utc().unix_timestamp_nanos() as i64;
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        let nanos = wall.max(previous + 1);
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|err| GatewayError::decode(err.to_string()))?
            .format(&Rfc3339)
            .map_err(|err| GatewayError::decode(err.to_string()))
    }

    fn publish(&self, collection: Collection, kind: ChangeKind) {
        if let Some(feed) = &self.feed {
            let receivers = feed.publish(ChangeEvent::new(kind, collection));
            debug!(collection = %collection, %kind, receivers, "Published change");
        }
    }
}

/// Column defaults the backend schema applies on insert.
fn defaults(collection: Collection) -> Vec<(&'static str, Value)> {
    match collection {
        Collection::Donations => vec![
            ("is_active", Value::Bool(true)),
            ("current_amount", Value::from(0)),
        ],
        Collection::Events => vec![("is_featured", Value::Bool(false))],
        Collection::Blogs => vec![("is_published", Value::Bool(false))],
        Collection::Messages => vec![("is_read", Value::Bool(false))],
        Collection::About => Vec::new(),
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn into_object(value: Value) -> Result<Map<String, Value>, GatewayError> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(GatewayError::rejected(
            400,
            format!("expected a JSON object, got `{other}`"),
        )),
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn fetch(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Vec<Value>, GatewayError> {
        self.enter(collection).await?;
        self.record_fetch(collection);
        Ok(spec.apply(self.rows(collection)))
    }

    async fn fetch_one(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Option<Value>, GatewayError> {
        self.enter(collection).await?;
        self.record_fetch(collection);
        let mut rows = spec.apply(self.rows(collection));
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            many => Err(GatewayError::rejected(
                406,
                format!("JSON object requested, {many} rows returned"),
            )),
        }
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, GatewayError> {
        self.enter(collection).await?;
        self.record_fetch(collection);
        let matching = self
            .tables
            .get(&collection)
            .map_or(0, |rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|filter| filter.matches(row)))
                    .count()
            });
        Ok(matching as u64)
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, GatewayError> {
        self.enter(collection).await?;
        self.authorize(collection, ChangeKind::Insert)?;

        let mut fields = into_object(row)?;
        let now = self.timestamp()?;
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(now.clone()));
        if collection.tracks_updates() {
            fields
                .entry("updated_at")
                .or_insert_with(|| Value::String(now.clone()));
        }
        for (column, default) in defaults(collection) {
            fields.entry(column).or_insert(default);
        }

        let inserted = Value::Object(fields);
        self.tables
            .entry(collection)
            .or_default()
            .push(inserted.clone());
        info!(collection = %collection, "Inserted row");
        self.publish(collection, ChangeKind::Insert);
        Ok(inserted)
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, GatewayError> {
        self.enter(collection).await?;
        self.authorize(collection, ChangeKind::Update)?;

        let patch = into_object(patch)?;
        let now = self.timestamp()?;
        let target = id.to_string();
        let updated = {
            let mut rows = self.tables.entry(collection).or_default();
            let row = rows
                .iter_mut()
                .find(|row| row_id(row) == Some(target.as_str()))
                .ok_or(GatewayError::NotFound { collection, id })?;
            if let Value::Object(fields) = row {
                for (column, value) in patch {
                    if column != "id" {
                        fields.insert(column, value);
                    }
                }
                if collection.tracks_updates() {
                    fields.insert("updated_at".to_string(), Value::String(now));
                }
            }
            row.clone()
        };
        info!(collection = %collection, %id, "Updated row");
        self.publish(collection, ChangeKind::Update);
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), GatewayError> {
        self.enter(collection).await?;
        self.authorize(collection, ChangeKind::Delete)?;

        let target = id.to_string();
        let removed = {
            let mut rows = self.tables.entry(collection).or_default();
            let before = rows.len();
            rows.retain(|row| row_id(row) != Some(target.as_str()));
            before - rows.len()
        };
        info!(collection = %collection, %id, removed, "Deleted row");
        if removed > 0 {
            self.publish(collection, ChangeKind::Delete);
        }
        Ok(())
    }

    async fn upload(&self, object: StoredObject) -> Result<String, GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.session.is_signed_in() {
            return Err(GatewayError::authorization(format!(
                "uploads to `{}` require a session",
                object.bucket
            )));
        }
        let url = format!("memory://{}/{}", object.bucket.name(), object.name);
        info!(bucket = %object.bucket, name = %object.name, "Stored object");
        self.objects.insert(url.clone(), object);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::{
        gateway::Bucket,
        realtime::{ChangeFeed, ChangeFilter, ChangeNotice},
        session::Session,
    };

    fn signed_in() -> SessionContext {
        let session = SessionContext::new();
        session.establish(Session {
            access_token: "token".into(),
            refresh_token: None,
            email: "admin@happylife.org".into(),
            expires_at: None,
        });
        session
    }

    #[tokio::test]
    async fn signed_out_writes_are_refused_except_contact_messages() {
        let gateway = MemoryGateway::new(SessionContext::new());

        let denied = gateway
            .insert(Collection::Blogs, json!({"title": "Hello"}))
            .await
            .expect_err("needs session");
        assert!(matches!(denied, GatewayError::Authorization { .. }));

        let message = gateway
            .insert(
                Collection::Messages,
                json!({"name": "Sita", "email": "sita@example.com", "subject": "Hi", "message": "Namaste"}),
            )
            .await
            .expect("public insert");
        assert_eq!(message["is_read"], json!(false));
        assert!(message.get("updated_at").is_none());
    }

    #[tokio::test]
    async fn insert_assigns_identity_and_defaults() {
        let gateway = MemoryGateway::new(signed_in());
        let row = gateway
            .insert(
                Collection::Donations,
                json!({"title": "Clean Water", "description": "Wells", "target_amount": 1000}),
            )
            .await
            .expect("inserted");

        assert!(row["id"].as_str().is_some_and(|id| id.parse::<Uuid>().is_ok()));
        assert_eq!(row["is_active"], json!(true));
        assert_eq!(row["current_amount"], json!(0));
        assert_eq!(row["created_at"], row["updated_at"]);
    }

    #[tokio::test]
    async fn update_merges_and_missing_rows_are_not_found() {
        let gateway = MemoryGateway::new(signed_in());
        let row = gateway
            .insert(Collection::Events, json!({"title": "Camp", "location": "Pokhara"}))
            .await
            .expect("inserted");
        let id: Uuid = row["id"].as_str().and_then(|id| id.parse().ok()).expect("id");

        let updated = gateway
            .update(Collection::Events, id, json!({"location": "Lalitpur"}))
            .await
            .expect("updated");
        assert_eq!(updated["title"], json!("Camp"));
        assert_eq!(updated["location"], json!("Lalitpur"));
        assert_ne!(updated["updated_at"], row["updated_at"]);

        let missing = gateway
            .update(Collection::Events, Uuid::new_v4(), json!({"title": "x"}))
            .await
            .expect_err("missing");
        assert!(matches!(missing, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_one_distinguishes_zero_and_many_rows() {
        let gateway = MemoryGateway::new(SessionContext::new());
        assert_eq!(
            gateway
                .fetch_one(Collection::About, &FetchSpec::new())
                .await
                .expect("empty"),
            None
        );

        gateway.seed(Collection::About, [json!({"id": "a"}), json!({"id": "b"})]);
        assert!(
            gateway
                .fetch_one(Collection::About, &FetchSpec::new())
                .await
                .is_err()
        );
        assert_eq!(gateway.fetch_count(Collection::About), 2);
    }

    #[tokio::test]
    async fn writes_publish_change_events() {
        let feed = LocalChangeFeed::default();
        let gateway = MemoryGateway::new(signed_in()).with_feed(feed.clone());
        let mut subscription = feed
            .subscribe("blogs-realtime-list", ChangeFilter::table(Collection::Blogs))
            .await
            .expect("subscribe");

        gateway
            .insert(Collection::Blogs, json!({"title": "News"}))
            .await
            .expect("inserted");
        assert_eq!(
            subscription.next().await,
            Some(ChangeNotice::Change(ChangeEvent::new(
                ChangeKind::Insert,
                Collection::Blogs
            )))
        );
    }

    #[tokio::test]
    async fn queued_faults_fail_the_next_matching_call() {
        let gateway = MemoryGateway::new(SessionContext::new());
        gateway.fail_next(Collection::Events, GatewayError::transport("reset"));

        assert!(gateway.fetch(Collection::Blogs, &FetchSpec::new()).await.is_ok());
        assert!(gateway.fetch(Collection::Events, &FetchSpec::new()).await.is_err());
        assert!(gateway.fetch(Collection::Events, &FetchSpec::new()).await.is_ok());
    }

    #[tokio::test]
    async fn uploads_need_a_session() {
        let object = StoredObject {
            bucket: Bucket::Blogs,
            name: "blog-1.png".into(),
            content_type: "image/png".into(),
            bytes: Bytes::from_static(b"png"),
        };
        let anonymous = MemoryGateway::new(SessionContext::new());
        assert!(anonymous.upload(object.clone()).await.is_err());

        let gateway = MemoryGateway::new(signed_in());
        let url = gateway.upload(object).await.expect("stored");
        assert_eq!(url, "memory://blog-images/blog-1.png");
        assert!(gateway.object(&url).is_some());
    }
}
