//! PostgREST-style REST gateway.

use std::time::Duration;

use async_trait::async_trait;
use happylife_types::Collection;
use reqwest::{
    Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, CONTENT_RANGE, CONTENT_TYPE},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{FetchSpec, Filter, GatewayError, RemoteGateway, storage::StoredObject};
use crate::session::SessionContext;

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";
const ZERO_ROWS_CODE: &str = "PGRST116";
const PERMISSION_DENIED_CODE: &str = "42501";

/// Base URL, anonymous key and HTTP client shared by the data, storage and auth endpoints.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
}

impl BackendClient {
    pub fn new(
        mut base: Url,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("happylife/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                GatewayError::transport(format!("failed to build http client: {err}"))
            })?;
        Ok(Self {
            http,
            base,
            anon_key: anon_key.into(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base
            .join(path)
            .map_err(|err| GatewayError::rejected(0, format!("invalid endpoint `{path}`: {err}")))
    }

    /// Build a request carrying the `apikey` header and a bearer token.
    ///
    /// Signed-out requests authenticate with the anonymous key.
    pub fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(self.anon_key.as_str()))
    }
}

/// Error body returned by the data API.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ApiError {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn is_zero_rows(&self) -> bool {
        self.code.as_deref() == Some(ZERO_ROWS_CODE)
            && self
                .details
                .as_deref()
                .is_none_or(|details| details.contains("0 rows"))
    }
}

pub(crate) fn map_status(status: StatusCode, body: &str) -> GatewayError {
    let error = ApiError::parse(body);
    let message = error
        .message
        .clone()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.to_string()
            }
        });

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || error.code.as_deref() == Some(PERMISSION_DENIED_CODE)
    {
        return GatewayError::authorization(message);
    }
    if status.is_server_error() {
        return GatewayError::Transport {
            status: Some(status.as_u16()),
            message,
        };
    }
    GatewayError::rejected(status.as_u16(), message)
}

async fn check(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, &body))
}

/// Read the total from a `Content-Range` header such as `0-24/25` or `*/0`.
pub(crate) fn parse_content_range(value: &str) -> Result<u64, GatewayError> {
    let total = value
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| GatewayError::decode(format!("malformed content-range `{value}`")))?;
    total
        .parse()
        .map_err(|_| GatewayError::decode(format!("content-range has no exact total: `{value}`")))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn filter_pair(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq { column, value } => (column.clone(), format!("eq.{}", render_value(value))),
        Filter::Neq { column, value } => (column.clone(), format!("neq.{}", render_value(value))),
    }
}

/// REST gateway over `{base}/rest/v1` and `{base}/storage/v1`.
pub struct RestGateway {
    client: BackendClient,
    session: SessionContext,
}

impl RestGateway {
    pub fn new(client: BackendClient, session: SessionContext) -> Self {
        Self { client, session }
    }

    fn table_url(
        &self,
        collection: Collection,
        spec: &FetchSpec,
        select: bool,
    ) -> Result<Url, GatewayError> {
        let mut url = self.client.endpoint(&format!("rest/v1/{}", collection.table()))?;
        {
            let mut pairs = url.query_pairs_mut();
            if select {
                pairs.append_pair("select", "*");
            }
            for filter in &spec.filters {
                let (column, expression) = filter_pair(filter);
                pairs.append_pair(&column, &expression);
            }
            if let Some(order) = &spec.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{direction}", order.column));
            }
            if let Some(limit) = spec.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self.session.access_token();
        self.client.request(method, url, token.as_deref())
    }
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn fetch(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Vec<Value>, GatewayError> {
        let url = self.table_url(collection, spec, true)?;
        debug!(collection = %collection, url = %url, "Fetching rows");
        let response = check(self.request(Method::GET, url).send().await?).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn fetch_one(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Option<Value>, GatewayError> {
        let url = self.table_url(collection, spec, true)?;
        debug!(collection = %collection, url = %url, "Fetching single row");
        let response = self
            .request(Method::GET, url)
            .header(ACCEPT, OBJECT_MEDIA_TYPE)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_ACCEPTABLE {
            let body = response.text().await.unwrap_or_default();
            if ApiError::parse(&body).is_zero_rows() {
                return Ok(None);
            }
            return Err(map_status(StatusCode::NOT_ACCEPTABLE, &body));
        }
        let response = check(response).await?;
        Ok(Some(response.json::<Value>().await?))
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, GatewayError> {
        let spec = FetchSpec {
            filters: filters.to_vec(),
            ..FetchSpec::default()
        };
        let url = self.table_url(collection, &spec, true)?;
        let response = self
            .request(Method::HEAD, url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check(response).await?;
        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| GatewayError::decode("missing content-range header"))?;
        parse_content_range(range)
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, GatewayError> {
        let url = self.client.endpoint(&format!("rest/v1/{}", collection.table()))?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![row]))
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Value>>().await?;
        let inserted = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::decode("insert returned no rows"))?;
        info!(collection = %collection, "Inserted row");
        Ok(inserted)
    }

    async fn append(&self, collection: Collection, row: Value) -> Result<(), GatewayError> {
        let url = self.client.endpoint(&format!("rest/v1/{}", collection.table()))?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(&Value::Array(vec![row]))
            .send()
            .await?;
        check(response).await?;
        info!(collection = %collection, "Appended row");
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, GatewayError> {
        let url = self.table_url(collection, &FetchSpec::by_id(id), false)?;
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Value>>().await?;
        let updated = rows
            .into_iter()
            .next()
            .ok_or(GatewayError::NotFound { collection, id })?;
        info!(collection = %collection, %id, "Updated row");
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), GatewayError> {
        let url = self.table_url(collection, &FetchSpec::by_id(id), false)?;
        check(self.request(Method::DELETE, url).send().await?).await?;
        info!(collection = %collection, %id, "Deleted row");
        Ok(())
    }

    async fn upload(&self, object: StoredObject) -> Result<String, GatewayError> {
        let bucket = object.bucket.name();
        let url = self
            .client
            .endpoint(&format!("storage/v1/object/{bucket}/{}", object.name))?;
        let response = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, &object.content_type)
            .body(object.bytes.clone())
            .send()
            .await?;
        check(response).await?;

        let public = object.public_url(self.client.base())?;
        info!(bucket, name = %object.name, "Uploaded object");
        Ok(public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_is_read_after_slash() {
        assert_eq!(parse_content_range("0-24/25").expect("total"), 25);
        assert_eq!(parse_content_range("*/0").expect("empty"), 0);
        assert!(parse_content_range("0-24/*").is_err());
        assert!(parse_content_range("garbage").is_err());
    }

    #[test]
    fn status_mapping_follows_error_taxonomy() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#),
            GatewayError::Authorization { message } if message == "JWT expired"
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, r#"{"code":"42501","message":"denied"}"#),
            GatewayError::Authorization { .. }
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(matches!(
            map_status(StatusCode::CONFLICT, r#"{"code":"23505","message":"duplicate"}"#),
            GatewayError::Rejected { status: 409, .. }
        ));
    }

    #[test]
    fn zero_rows_is_recognized_only_for_empty_results() {
        let empty = ApiError::parse(
            r#"{"code":"PGRST116","details":"The result contains 0 rows","message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert!(empty.is_zero_rows());
        let many = ApiError::parse(r#"{"code":"PGRST116","details":"The result contains 2 rows"}"#);
        assert!(!many.is_zero_rows());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = BackendClient::new(
            Url::parse("http://localhost:54321/project").expect("url"),
            "anon",
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(
            client.endpoint("rest/v1/blogs").expect("endpoint").as_str(),
            "http://localhost:54321/project/rest/v1/blogs"
        );
    }
}
