//! Wires the gateway, query cache, change feed and session into one handle
//! that pages and admin actions share.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    cache::{CacheConfig, QueryCache},
    config::{CarouselSettings, Settings},
    error::AppError,
    gateway::{BackendClient, MemoryGateway, Records, RemoteGateway, RestGateway},
    realtime::{ChangeFeed, LocalChangeFeed, PgChangeFeed},
    session::{RestAuth, SessionContext, SessionManager, StaticAuth},
    views::{Notifications, QueryCatalog},
};

#[derive(Clone)]
pub struct AppContext {
    records: Records,
    cache: QueryCache,
    catalog: QueryCatalog,
    feed: Arc<dyn ChangeFeed>,
    session: SessionManager,
    notifications: Notifications,
    carousel: CarouselSettings,
}

impl AppContext {
    pub fn new(
        records: Records,
        cache: QueryCache,
        feed: Arc<dyn ChangeFeed>,
        session: SessionManager,
        notifications: Notifications,
        carousel: CarouselSettings,
    ) -> Self {
        let catalog = QueryCatalog::new(records.clone(), &cache);
        Self {
            records,
            cache,
            catalog,
            feed,
            session,
            notifications,
            carousel,
        }
    }

    /// Connect to the hosted backend described by `settings`.
    ///
    /// Change notifications come from Postgres when a database URL is
    /// configured; otherwise only this process's own writes are seen.
    pub fn connect(settings: &Settings) -> Result<Self, AppError> {
        let (url, anon_key) = settings.backend_endpoint()?;
        let client = BackendClient::new(url, anon_key, settings.backend.timeout)?;
        let session = SessionContext::new();

        let gateway: Arc<dyn RemoteGateway> =
            Arc::new(RestGateway::new(client.clone(), session.clone()));
        let feed: Arc<dyn ChangeFeed> = match &settings.realtime.database_url {
            Some(database_url) => Arc::new(PgChangeFeed::new(database_url.clone())),
            None => {
                warn!("No realtime database configured; remote changes will not refresh views");
                Arc::new(LocalChangeFeed::new(settings.realtime.buffer.get()))
            }
        };

        info!(backend = %client.base(), "Backend client ready");
        Ok(Self::new(
            Records::new(gateway),
            QueryCache::new(CacheConfig::from(&settings.cache)),
            feed,
            SessionManager::new(session, Arc::new(RestAuth::new(client))),
            notifications(settings),
            settings.carousel,
        ))
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn feed(&self) -> &dyn ChangeFeed {
        self.feed.as_ref()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn carousel(&self) -> CarouselSettings {
        self.carousel
    }
}

fn notifications(settings: &Settings) -> Notifications {
    Notifications::new(
        settings.notifications.capacity.get(),
        settings.notifications.ttl,
    )
}

/// In-process backend: memory tables, a local change feed and a fixed
/// credential table. Writes made through `gateway` reach mounted views the
/// same way remote changes would.
pub struct OfflineBackend {
    pub gateway: Arc<MemoryGateway>,
    pub feed: LocalChangeFeed,
    pub context: AppContext,
}

impl OfflineBackend {
    pub fn new<I, E, P>(settings: &Settings, accounts: I) -> Self
    where
        I: IntoIterator<Item = (E, P)>,
        E: Into<String>,
        P: Into<String>,
    {
        let session = SessionContext::new();
        let feed = LocalChangeFeed::new(settings.realtime.buffer.get());
        let gateway = Arc::new(MemoryGateway::new(session.clone()).with_feed(feed.clone()));
        let context = AppContext::new(
            Records::new(gateway.clone()),
            QueryCache::new(CacheConfig::from(&settings.cache)),
            Arc::new(feed.clone()),
            SessionManager::new(session, Arc::new(StaticAuth::new(accounts))),
            notifications(settings),
            settings.carousel,
        );
        Self {
            gateway,
            feed,
            context,
        }
    }
}
