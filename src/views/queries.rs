//! The site's queries: keys, filters, ordering and fetch policy.

use std::time::Duration;

use happylife_types::{
    AboutUs, Blog, Collection, ContactMessage, DashboardStats, Donation, Event, Record,
};
use uuid::Uuid;

use crate::{
    cache::{Query, QueryCache, QueryKey, QueryOptions},
    gateway::{FetchSpec, Filter, Records},
    query_key,
};

pub const HOME_BLOG_LIMIT: usize = 6;
pub const HOME_EVENT_LIMIT: usize = 4;
pub const RELATED_BLOG_LIMIT: usize = 3;

/// Key roots. Invalidating a root covers every key below it.
pub mod roots {
    use crate::{cache::QueryKey, query_key};

    pub fn donations() -> QueryKey {
        query_key!("donations")
    }

    pub fn donation() -> QueryKey {
        query_key!("donation")
    }

    pub fn events() -> QueryKey {
        query_key!("events")
    }

    pub fn event() -> QueryKey {
        query_key!("event")
    }

    pub fn blogs() -> QueryKey {
        query_key!("blogs")
    }

    pub fn blog() -> QueryKey {
        query_key!("blog")
    }

    pub fn about() -> QueryKey {
        query_key!("about")
    }

    pub fn messages() -> QueryKey {
        query_key!("messages")
    }

    pub fn dashboard() -> QueryKey {
        query_key!("dashboard-stats")
    }
}

/// Builds every query a page can mount, bound to one [`Records`] handle.
#[derive(Clone)]
pub struct QueryCatalog {
    records: Records,
    options: QueryOptions,
    dashboard_refresh: Duration,
}

impl QueryCatalog {
    pub fn new(records: Records, cache: &QueryCache) -> Self {
        Self {
            records,
            options: cache.default_options(),
            dashboard_refresh: cache.config().dashboard_refresh(),
        }
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    fn list<T: Record>(&self, key: QueryKey, spec: FetchSpec) -> Query<Vec<T>> {
        let records = self.records.clone();
        Query::new(key, move || {
            let records = records.clone();
            let spec = spec.clone();
            async move { records.list::<T>(&spec).await }
        })
        .reads(T::COLLECTION)
        .with_options(self.options.clone())
    }

    fn single<T: Record>(&self, key: QueryKey, id: Uuid) -> Query<Option<T>> {
        let records = self.records.clone();
        Query::new(key, move || {
            let records = records.clone();
            async move { records.get::<T>(id).await }
        })
        .reads(T::COLLECTION)
        .with_options(self.options.clone())
    }

    fn home<T>(query: Query<T>) -> Query<T>
    where
        T: Send + Sync + 'static,
    {
        let options = query.options().clone().without_focus_refetch();
        query.with_options(options)
    }

    pub fn home_donations(&self) -> Query<Vec<Donation>> {
        Self::home(self.list(
            query_key!("donations", "home"),
            FetchSpec::new()
                .filter(Filter::eq("is_active", true))
                .order_desc("created_at"),
        ))
    }

    pub fn all_donations(&self) -> Query<Vec<Donation>> {
        self.list(
            query_key!("donations", "all"),
            FetchSpec::new().order_desc("created_at"),
        )
    }

    pub fn admin_donations(&self) -> Query<Vec<Donation>> {
        self.list(
            query_key!("donations", "admin"),
            FetchSpec::new().order_desc("created_at"),
        )
    }

    pub fn donation(&self, id: Uuid) -> Query<Option<Donation>> {
        self.single(query_key!("donation", id), id)
    }

    pub fn home_events(&self) -> Query<Vec<Event>> {
        Self::home(self.list(
            query_key!("events", "home"),
            FetchSpec::new()
                .order_asc("event_date")
                .limit(HOME_EVENT_LIMIT),
        ))
    }

    pub fn all_events(&self) -> Query<Vec<Event>> {
        self.list(
            query_key!("events", "all"),
            FetchSpec::new().order_asc("event_date"),
        )
    }

    pub fn admin_events(&self) -> Query<Vec<Event>> {
        self.list(
            query_key!("events", "admin"),
            FetchSpec::new().order_desc("event_date"),
        )
    }

    pub fn event(&self, id: Uuid) -> Query<Option<Event>> {
        self.single(query_key!("event", id), id)
    }

    pub fn home_blogs(&self) -> Query<Vec<Blog>> {
        Self::home(self.list(
            query_key!("blogs", "home"),
            FetchSpec::new()
                .filter(Filter::eq("is_published", true))
                .order_desc("created_at")
                .limit(HOME_BLOG_LIMIT),
        ))
    }

    pub fn all_blogs(&self) -> Query<Vec<Blog>> {
        self.list(
            query_key!("blogs", "all"),
            FetchSpec::new()
                .filter(Filter::eq("is_published", true))
                .order_desc("created_at"),
        )
    }

    pub fn admin_blogs(&self) -> Query<Vec<Blog>> {
        self.list(
            query_key!("blogs", "admin"),
            FetchSpec::new().order_desc("created_at"),
        )
    }

    pub fn blog(&self, id: Uuid) -> Query<Option<Blog>> {
        self.single(query_key!("blog", id), id)
    }

    /// Other published posts shown under a blog post.
    pub fn related_blogs(&self, id: Uuid) -> Query<Vec<Blog>> {
        self.list(
            query_key!("blogs", "related", id),
            FetchSpec::new()
                .filter(Filter::eq("is_published", true))
                .filter(Filter::neq("id", id.to_string()))
                .order_desc("created_at")
                .limit(RELATED_BLOG_LIMIT),
        )
    }

    /// The about page is the most recently created row, if any.
    pub fn about(&self) -> Query<Option<AboutUs>> {
        let records = self.records.clone();
        Query::new(roots::about(), move || {
            let records = records.clone();
            async move { records.latest::<AboutUs>().await }
        })
        .reads(Collection::About)
        .with_options(self.options.clone().without_focus_refetch())
    }

    pub fn messages(&self) -> Query<Vec<ContactMessage>> {
        self.list(
            query_key!("messages", "admin"),
            FetchSpec::new().order_desc("created_at"),
        )
    }

    /// Dashboard counters, polled while the dashboard is mounted.
    pub fn dashboard_stats(&self) -> Query<DashboardStats> {
        let records = self.records.clone();
        Query::new(roots::dashboard(), move || {
            let records = records.clone();
            async move { dashboard_stats(&records).await }
        })
        .reads(Collection::Donations)
        .reads(Collection::Events)
        .reads(Collection::Blogs)
        .reads(Collection::Messages)
        .with_options(self.options.clone().polling(self.dashboard_refresh))
    }
}

async fn dashboard_stats(
    records: &Records,
) -> Result<DashboardStats, crate::gateway::GatewayError> {
    let active = [Filter::eq("is_active", true)];
    let published = [Filter::eq("is_published", true)];
    let unread = [Filter::eq("is_read", false)];
    let (
        total_donations,
        active_donations,
        total_events,
        total_blogs,
        published_blogs,
        total_messages,
        unread_messages,
    ) = futures::try_join!(
        records.count(Collection::Donations, &[]),
        records.count(Collection::Donations, &active),
        records.count(Collection::Events, &[]),
        records.count(Collection::Blogs, &[]),
        records.count(Collection::Blogs, &published),
        records.count(Collection::Messages, &[]),
        records.count(Collection::Messages, &unread),
    )?;
    Ok(DashboardStats {
        total_donations,
        active_donations,
        total_events,
        total_blogs,
        published_blogs,
        total_messages,
        unread_messages,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{cache::CacheConfig, gateway::MemoryGateway, session::SessionContext};

    fn catalog() -> (Arc<MemoryGateway>, QueryCatalog, QueryCache) {
        let gateway = Arc::new(MemoryGateway::new(SessionContext::new()));
        let cache = QueryCache::new(CacheConfig::default());
        let catalog = QueryCatalog::new(Records::new(gateway.clone()), &cache);
        (gateway, catalog, cache)
    }

    fn blog(id: &str, published: bool, created: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": format!("Post {id}"),
            "content": "Body",
            "author": "Team",
            "is_published": published,
            "created_at": created,
            "updated_at": created,
        })
    }

    #[tokio::test]
    async fn home_blogs_are_published_newest_first_and_capped() {
        let (gateway, catalog, cache) = catalog();
        let rows = (0..8).map(|day| {
            blog(
                &Uuid::from_u128(day).to_string(),
                day != 7,
                &format!("2024-03-{:02}T00:00:00Z", day + 1),
            )
        });
        gateway.seed(Collection::Blogs, rows);

        let blogs = cache.fetch(&catalog.home_blogs()).await.expect("blogs");
        assert_eq!(blogs.len(), HOME_BLOG_LIMIT);
        assert!(blogs.iter().all(|blog| blog.is_published));
        assert_eq!(blogs[0].id, Uuid::from_u128(6));
        assert!(!catalog.home_blogs().options().refetch_on_focus);
        assert!(catalog.all_blogs().options().refetch_on_focus);
    }

    #[tokio::test]
    async fn related_blogs_exclude_the_current_post() {
        let (gateway, catalog, cache) = catalog();
        let current = Uuid::from_u128(1);
        gateway.seed(
            Collection::Blogs,
            [
                blog(&current.to_string(), true, "2024-03-05T00:00:00Z"),
                blog(&Uuid::from_u128(2).to_string(), true, "2024-03-04T00:00:00Z"),
                blog(&Uuid::from_u128(3).to_string(), false, "2024-03-03T00:00:00Z"),
            ],
        );

        let related = cache
            .fetch(&catalog.related_blogs(current))
            .await
            .expect("related");
        let ids: Vec<_> = related.iter().map(|blog| blog.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2)]);
    }

    #[tokio::test]
    async fn missing_about_row_is_absent() {
        let (_, catalog, cache) = catalog();
        assert_eq!(*cache.fetch(&catalog.about()).await.expect("about"), None);
    }

    #[tokio::test]
    async fn dashboard_counts_each_collection() {
        let (gateway, catalog, cache) = catalog();
        gateway.seed(
            Collection::Messages,
            [
                json!({"id": Uuid::from_u128(1).to_string(), "is_read": false}),
                json!({"id": Uuid::from_u128(2).to_string(), "is_read": true}),
            ],
        );
        gateway.seed(Collection::Donations, [json!({"is_active": true})]);

        let query = catalog.dashboard_stats();
        assert_eq!(query.options().refetch_interval, Some(Duration::from_secs(30)));
        let stats = cache.fetch(&query).await.expect("stats");
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.unread_messages, 1);
        assert_eq!(stats.active_donations, 1);
        assert_eq!(stats.total_blogs, 0);
    }
}
