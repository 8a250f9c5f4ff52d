//! HappyLife query cache.
//!
//! Client-side cache of backend query results keyed by semantic tuples
//! such as `["blogs", "home"]` or `["blog", <id>]`:
//!
//! - **Deduplication**: at most one in-flight fetch per key, shared by all readers
//! - **Invalidation**: by key prefix or by backend collection
//! - **Observers**: mounted views refetch on invalidation, focus and polling
//! - **Retry**: retryable failures are retried before surfacing an error state
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_entries = 256
//! retry = 1
//! refetch_on_focus = true
//! dashboard_refresh_seconds = 30
//! ```

mod config;
mod error;
mod keys;
pub(crate) mod lock;
mod observer;
mod query;
mod registry;
mod store;

pub use config::CacheConfig;
pub use error::QueryError;
pub use keys::{KeyPart, QueryKey};
pub use observer::QueryObserver;
pub use query::{Query, QueryOptions, QueryState};
pub use registry::CollectionRegistry;
pub use store::QueryCache;
