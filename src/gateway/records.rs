use std::sync::Arc;

use happylife_types::{Collection, Payload, Record};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use super::{FetchSpec, Filter, GatewayError, RemoteGateway, StoredObject};

/// Typed helpers over a [`RemoteGateway`].
#[derive(Clone)]
pub struct Records {
    gateway: Arc<dyn RemoteGateway>,
}

fn decode<T: Record>(row: Value) -> Result<T, GatewayError> {
    serde_json::from_value(row).map_err(|err| {
        GatewayError::decode(format!("invalid `{}` row: {err}", T::COLLECTION))
    })
}

fn encode<P: Payload>(payload: &P) -> Result<Value, GatewayError> {
    serde_json::to_value(payload).map_err(|err| {
        GatewayError::decode(format!("invalid `{}` payload: {err}", P::COLLECTION))
    })
}

impl Records {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    pub async fn list<T: Record>(&self, spec: &FetchSpec) -> Result<Vec<T>, GatewayError> {
        self.gateway
            .fetch(T::COLLECTION, spec)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Single row by id; zero matches is `None`.
    pub async fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>, GatewayError> {
        self.first::<T>(&FetchSpec::by_id(id)).await
    }

    pub async fn first<T: Record>(&self, spec: &FetchSpec) -> Result<Option<T>, GatewayError> {
        self.gateway
            .fetch_one(T::COLLECTION, spec)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    /// Most recently created row, the convention for singleton collections.
    pub async fn latest<T: Record>(&self) -> Result<Option<T>, GatewayError> {
        self.first::<T>(&FetchSpec::new().order_desc("created_at").limit(1))
            .await
    }

    pub async fn insert<T, P>(&self, payload: &P) -> Result<T, GatewayError>
    where
        T: Record,
        P: Payload,
    {
        debug_assert_eq!(T::COLLECTION, P::COLLECTION);
        let row = self.gateway.insert(P::COLLECTION, encode(payload)?).await?;
        decode(row)
    }

    /// Insert without reading the stored row back.
    pub async fn submit<P: Payload>(&self, payload: &P) -> Result<(), GatewayError> {
        self.gateway.append(P::COLLECTION, encode(payload)?).await
    }

    /// Patch a row. Collections that track edits get a fresh `updated_at`.
    pub async fn update<T, P>(&self, id: Uuid, payload: &P) -> Result<T, GatewayError>
    where
        T: Record,
        P: Payload,
    {
        debug_assert_eq!(T::COLLECTION, P::COLLECTION);
        let mut patch = encode(payload)?;
        if P::COLLECTION.tracks_updates()
            && let Value::Object(fields) = &mut patch
        {
            let now = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .map_err(|err| GatewayError::decode(err.to_string()))?;
            fields.insert("updated_at".to_string(), Value::String(now));
        }
        let row = self.gateway.update(P::COLLECTION, id, patch).await?;
        decode(row)
    }

    pub async fn delete<T: Record>(&self, id: Uuid) -> Result<(), GatewayError> {
        self.gateway.delete(T::COLLECTION, id).await
    }

    pub async fn count(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<u64, GatewayError> {
        self.gateway.count(collection, filters).await
    }

    pub async fn upload(&self, object: StoredObject) -> Result<String, GatewayError> {
        self.gateway.upload(object).await
    }
}
