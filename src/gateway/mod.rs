//! Remote data gateway.
//!
//! Typed access to the backend's collections and object storage. The
//! [`RemoteGateway`] trait works on JSON rows; [`Records`] layers the
//! entity types from `happylife-types` on top.

mod error;
mod memory;
mod records;
mod rest;
mod storage;

use std::cmp::Ordering;

use async_trait::async_trait;
use happylife_types::Collection;
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub use error::GatewayError;
pub use memory::MemoryGateway;
pub use records::Records;
pub use rest::{BackendClient, RestGateway};
pub use storage::{Bucket, StoredObject, UnknownBucket};

/// Row predicate in the data API's filter vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    Neq { column: String, value: Value },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Evaluate the predicate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::Eq { column, value } => row.get(column) == Some(value),
            Self::Neq { column, value } => row.get(column) != Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filter, order and limit for a collection read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSpec {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl FetchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().filter(Filter::eq("id", id.to_string()))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply filters, ordering and limit to in-memory rows the way the data API does.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = rows
            .into_iter()
            .filter(|row| self.filters.iter().all(|filter| filter.matches(row)))
            .collect();

        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Nulls sort last ascending, like PostgreSQL. Timestamps compare as instants.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (
                OffsetDateTime::parse(a, &Rfc3339),
                OffsetDateTime::parse(b, &Rfc3339),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

/// Query, mutation and upload operations against the backend.
///
/// A single-row read that matches nothing is `Ok(None)`, never an error.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn fetch(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn fetch_one(
        &self,
        collection: Collection,
        spec: &FetchSpec,
    ) -> Result<Option<Value>, GatewayError>;

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, GatewayError>;

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, GatewayError>;

    /// Insert without reading the row back, for writers that may not select
    /// from the collection (anonymous contact messages).
    async fn append(&self, collection: Collection, row: Value) -> Result<(), GatewayError> {
        self.insert(collection, row).await.map(|_| ())
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, GatewayError>;

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), GatewayError>;

    /// Store an object and return its public URL.
    async fn upload(&self, object: StoredObject) -> Result<String, GatewayError>;
}
