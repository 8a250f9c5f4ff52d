//! Mounted pages.
//!
//! Each page observes the queries it renders and opens the realtime channels
//! it listens on. Dropping a page releases both.

use std::sync::Arc;

use happylife_types::{
    AboutUs, Blog, Collection, ContactMessage, DashboardStats, Donation, Event,
};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use super::{
    ViewScope,
    carousel::{Carousel, CarouselHandle},
    notify::Notifications,
    routes::Route,
    search::{SearchFilter, Searchable},
};
use crate::{
    cache::{Query, QueryCache, QueryError, QueryObserver, QueryState},
    context::AppContext,
    realtime::RealtimeError,
    session::AuthError,
};

/// Arrow-button scroll distance of the home blog strip.
pub const BLOG_SCROLL_STEP: f64 = 350.0;

pub const HOME_BLOGS_CHANNEL: &str = "blogs-realtime-home";
pub const HOME_EVENTS_CHANNEL: &str = "events-home";
pub const DONATIONS_LIST_CHANNEL: &str = "donations-realtime-list";
pub const EVENTS_LIST_CHANNEL: &str = "events-realtime-list";
pub const BLOGS_LIST_CHANNEL: &str = "blogs-realtime-list";

/// Text of the about section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AboutContent {
    pub title: String,
    pub content: String,
    pub mission: Option<String>,
    pub vision: Option<String>,
    pub image_url: Option<String>,
}

impl AboutContent {
    /// Shown until an about row exists.
    pub fn fallback() -> Self {
        Self {
            title: "About Us".to_string(),
            content: "We are committed to making a positive impact in the community through \
                      education, health, and sustainable development initiatives."
                .to_string(),
            mission: Some(
                "Empowering communities, providing essential resources, and fostering \
                 sustainable growth."
                    .to_string(),
            ),
            vision: None,
            image_url: Some("/gallery2.jpg".to_string()),
        }
    }
}

impl From<&AboutUs> for AboutContent {
    fn from(row: &AboutUs) -> Self {
        Self {
            title: row.title.clone(),
            content: row.content.clone(),
            mission: row.mission.clone(),
            vision: row.vision.clone(),
            image_url: row.image_url.clone(),
        }
    }
}

fn fallback_donation(
    seed: u128,
    title: &str,
    description: &str,
    target: f64,
    current: f64,
    image: &str,
) -> Donation {
    Donation {
        id: Uuid::from_u128(seed),
        title: title.to_string(),
        description: description.to_string(),
        target_amount: target,
        current_amount: current,
        image_url: Some(image.to_string()),
        is_active: true,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

/// Causes shown on the home page while none are active.
pub fn fallback_donations() -> Vec<Donation> {
    vec![
        fallback_donation(
            1,
            "Education for Children",
            "Help provide books and school supplies.",
            5000.0,
            3200.0,
            "https://images.lifestyleasia.com/wp-content/uploads/sites/7/2020/04/22155743/Optimized-GettyImages-467143466.jpg",
        ),
        fallback_donation(
            2,
            "Healthcare Support",
            "Provide essential healthcare services.",
            3000.0,
            2100.0,
            "https://miro.medium.com/v2/1*M7uNg2mEmFke_qQ8RjlhQg.jpeg",
        ),
    ]
}

/// The landing page: about, donation strip, upcoming events and recent posts.
pub struct HomePage {
    about: QueryObserver<Option<AboutUs>>,
    donations: QueryObserver<Vec<Donation>>,
    events: QueryObserver<Vec<Event>>,
    blogs: QueryObserver<Vec<Blog>>,
    donation_strip: CarouselHandle,
    blog_strip: CarouselHandle,
    fallback: Arc<Vec<Donation>>,
    scope: ViewScope,
}

impl HomePage {
    pub async fn mount(context: &AppContext) -> Result<Self, RealtimeError> {
        let cache = context.cache();
        let catalog = context.catalog();
        let mut scope = ViewScope::new("home");

        let about = cache.observe(catalog.about());
        let donations = cache.observe(catalog.home_donations());
        let events = cache.observe(catalog.home_events());
        let blogs = cache.observe(catalog.home_blogs());

        scope.live(context, HOME_BLOGS_CHANNEL, Collection::Blogs).await?;
        scope.live(context, HOME_EVENTS_CHANNEL, Collection::Events).await?;

        let settings = context.carousel();
        let donation_strip =
            CarouselHandle::new(Carousel::new(0.0, 0.0).with_step(settings.step));
        scope.adopt(donation_strip.drive(settings.interval));

        Ok(Self {
            about,
            donations,
            events,
            blogs,
            donation_strip,
            blog_strip: CarouselHandle::new(Carousel::new(0.0, 0.0)),
            fallback: Arc::new(fallback_donations()),
            scope,
        })
    }

    pub fn about(&self) -> AboutContent {
        self.about
            .state()
            .data()
            .and_then(|row| Option::as_ref(row).map(AboutContent::from))
            .unwrap_or_else(AboutContent::fallback)
    }

    /// Active donations, or the fallback causes when there are none to show.
    ///
    /// Load errors are not surfaced here; the strip keeps showing something.
    pub fn donations(&self) -> Arc<Vec<Donation>> {
        match self.donations.state().data() {
            Some(rows) if !rows.is_empty() => Arc::clone(rows),
            _ => Arc::clone(&self.fallback),
        }
    }

    pub fn events(&self) -> QueryState<Vec<Event>> {
        self.events.state()
    }

    pub fn blogs(&self) -> QueryState<Vec<Blog>> {
        self.blogs.state()
    }

    pub fn donation_strip(&self) -> &CarouselHandle {
        &self.donation_strip
    }

    pub fn blog_strip(&self) -> &CarouselHandle {
        &self.blog_strip
    }

    pub fn scroll_blogs(&self, forward: bool) {
        let delta = if forward {
            BLOG_SCROLL_STEP
        } else {
            -BLOG_SCROLL_STEP
        };
        self.blog_strip.with(|strip| strip.scroll_by(delta));
    }

    /// Wait for any section to settle or be invalidated.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            changed = self.about.changed() => changed,
            changed = self.donations.changed() => changed,
            changed = self.events.changed() => changed,
            changed = self.blogs.changed() => changed,
        }
    }

    /// Wait until every section has finished loading.
    pub async fn settled(&mut self) {
        self.about.settled().await;
        self.donations.settled().await;
        self.events.settled().await;
        self.blogs.settled().await;
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }
}

/// A public list page with search and live refresh.
pub struct ListPage<T> {
    items: QueryObserver<Vec<T>>,
    filter: SearchFilter<T>,
    scope: ViewScope,
}

impl<T> ListPage<T>
where
    T: Searchable + Clone + Send + Sync + 'static,
{
    async fn mount_with(
        context: &AppContext,
        page: &'static str,
        query: Query<Vec<T>>,
        channel: &str,
        collection: Collection,
    ) -> Result<Self, RealtimeError> {
        let mut scope = ViewScope::new(page);
        let items = context.cache().observe(query);
        scope.live(context, channel, collection).await?;
        Ok(Self {
            items,
            filter: SearchFilter::new(),
            scope,
        })
    }

    pub fn search_query(&self) -> &str {
        self.filter.query()
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.filter.set_query(query);
    }

    /// Rows matching the search, from the latest cached list.
    pub fn items(&mut self) -> Arc<Vec<T>> {
        match self.items.state().data() {
            Some(rows) => self.filter.apply(rows),
            None => Arc::default(),
        }
    }

    pub fn state(&self) -> QueryState<Vec<T>> {
        self.items.state()
    }

    pub async fn changed(&mut self) -> bool {
        self.items.changed().await
    }

    pub async fn settled(&mut self) -> QueryState<Vec<T>> {
        self.items.settled().await
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }
}

impl ListPage<Donation> {
    pub async fn donations(context: &AppContext) -> Result<Self, RealtimeError> {
        Self::mount_with(
            context,
            "donations",
            context.catalog().all_donations(),
            DONATIONS_LIST_CHANNEL,
            Collection::Donations,
        )
        .await
    }
}

impl ListPage<Event> {
    pub async fn events(context: &AppContext) -> Result<Self, RealtimeError> {
        Self::mount_with(
            context,
            "events",
            context.catalog().all_events(),
            EVENTS_LIST_CHANNEL,
            Collection::Events,
        )
        .await
    }

    /// Matching events split into upcoming and past relative to `now`.
    pub fn upcoming_and_past(&mut self, now: OffsetDateTime) -> (Vec<Event>, Vec<Event>) {
        self.items()
            .iter()
            .cloned()
            .partition(|event| event.is_upcoming(now))
    }
}

impl ListPage<Blog> {
    pub async fn blogs(context: &AppContext) -> Result<Self, RealtimeError> {
        Self::mount_with(
            context,
            "blogs",
            context.catalog().all_blogs(),
            BLOGS_LIST_CHANNEL,
            Collection::Blogs,
        )
        .await
    }
}

/// A single record page. Detail pages do not listen for changes.
pub struct DetailPage<T> {
    record: QueryObserver<Option<T>>,
    route: Route,
    share_text: &'static str,
    _scope: ViewScope,
}

impl<T: Clone + Send + Sync + 'static> DetailPage<T> {
    fn mount_with(
        context: &AppContext,
        page: &'static str,
        query: Query<Option<T>>,
        route: Route,
        share_text: &'static str,
    ) -> Self {
        Self {
            record: context.cache().observe(query),
            route,
            share_text,
            _scope: ViewScope::new(page),
        }
    }

    pub fn state(&self) -> QueryState<Option<T>> {
        self.record.state()
    }

    pub fn record(&self) -> Option<T> {
        self.record
            .state()
            .data()
            .and_then(|row| (**row).clone())
    }

    /// Settled with no matching row: the page shows its not-found view.
    pub fn is_missing(&self) -> bool {
        matches!(self.record.state(), QueryState::Ready(row) if row.is_none())
    }

    pub async fn settled(&mut self) -> QueryState<Option<T>> {
        self.record.settled().await
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Link to this page, announced with a toast.
    pub fn share(&self, site: &Url, notifications: &Notifications) -> Option<Url> {
        let link = self.route.share_url(site)?;
        notifications.success("Link copied!", self.share_text);
        Some(link)
    }
}

impl DetailPage<Donation> {
    pub fn donation(context: &AppContext, id: Uuid) -> Self {
        Self::mount_with(
            context,
            "donation",
            context.catalog().donation(id),
            Route::Donation(id),
            "Share this donation with others",
        )
    }
}

impl DetailPage<Event> {
    pub fn event(context: &AppContext, id: Uuid) -> Self {
        Self::mount_with(
            context,
            "event",
            context.catalog().event(id),
            Route::Event(id),
            "Share this event with others",
        )
    }
}

/// A blog post and, once it has loaded, its related posts.
pub struct BlogDetailPage {
    post: DetailPage<Blog>,
    cache: QueryCache,
    related_query: Query<Vec<Blog>>,
    related: Option<QueryObserver<Vec<Blog>>>,
}

impl BlogDetailPage {
    pub fn mount(context: &AppContext, id: Uuid) -> Self {
        Self {
            post: DetailPage::mount_with(
                context,
                "blog",
                context.catalog().blog(id),
                Route::Blog(id),
                "Share this blog post with others",
            ),
            cache: context.cache().clone(),
            related_query: context.catalog().related_blogs(id),
            related: None,
        }
    }

    pub fn post(&self) -> &DetailPage<Blog> {
        &self.post
    }

    fn mount_related(&mut self) -> Option<&mut QueryObserver<Vec<Blog>>> {
        if self.related.is_none() && self.post.record().is_some() {
            self.related = Some(self.cache.observe(self.related_query.clone()));
        }
        self.related.as_mut()
    }

    /// Related posts; empty until the post itself has loaded.
    pub fn related(&mut self) -> Arc<Vec<Blog>> {
        self.mount_related()
            .and_then(|related| related.state().data().cloned())
            .unwrap_or_default()
    }

    pub async fn settled(&mut self) -> (Option<Blog>, Arc<Vec<Blog>>) {
        self.post.settled().await;
        let post = self.post.record();
        let related = match self.mount_related() {
            Some(related) => related.settled().await.data().cloned().unwrap_or_default(),
            None => Arc::default(),
        };
        (post, related)
    }

    pub fn has_related_mounted(&self) -> bool {
        self.related.is_some()
    }
}

/// Admin dashboard counters, polled while mounted.
pub struct AdminDashboardPage {
    stats: QueryObserver<DashboardStats>,
    _scope: ViewScope,
}

impl AdminDashboardPage {
    pub fn mount(context: &AppContext) -> Result<Self, AuthError> {
        context.session().require()?;
        Ok(Self {
            stats: context.cache().observe(context.catalog().dashboard_stats()),
            _scope: ViewScope::new("admin-dashboard"),
        })
    }

    /// Latest counters; zero until the first load completes.
    pub fn stats(&self) -> DashboardStats {
        self.stats
            .state()
            .data()
            .map(|stats| **stats)
            .unwrap_or_default()
    }

    pub fn state(&self) -> QueryState<DashboardStats> {
        self.stats.state()
    }

    pub async fn changed(&mut self) -> bool {
        self.stats.changed().await
    }

    pub async fn settled(&mut self) -> QueryState<DashboardStats> {
        self.stats.settled().await
    }
}

/// Admin table of every row in a collection, newest first.
pub struct AdminListPage<T> {
    rows: QueryObserver<Vec<T>>,
    _scope: ViewScope,
}

impl<T: Send + Sync + 'static> AdminListPage<T> {
    fn mount_with(
        context: &AppContext,
        page: &'static str,
        query: Query<Vec<T>>,
    ) -> Result<Self, AuthError> {
        context.session().require()?;
        Ok(Self {
            rows: context.cache().observe(query),
            _scope: ViewScope::new(page),
        })
    }

    pub fn rows(&self) -> Arc<Vec<T>> {
        self.rows.state().data().cloned().unwrap_or_default()
    }

    pub fn state(&self) -> QueryState<Vec<T>> {
        self.rows.state()
    }

    pub async fn changed(&mut self) -> bool {
        self.rows.changed().await
    }

    pub async fn settled(&mut self) -> QueryState<Vec<T>> {
        self.rows.settled().await
    }

    /// Settled rows, or the error the table would show.
    pub async fn load(&mut self) -> Result<Arc<Vec<T>>, QueryError> {
        self.rows.ready().await
    }
}

impl AdminListPage<Donation> {
    pub fn donations(context: &AppContext) -> Result<Self, AuthError> {
        Self::mount_with(context, "admin-donations", context.catalog().admin_donations())
    }
}

impl AdminListPage<Event> {
    pub fn events(context: &AppContext) -> Result<Self, AuthError> {
        Self::mount_with(context, "admin-events", context.catalog().admin_events())
    }
}

impl AdminListPage<Blog> {
    pub fn blogs(context: &AppContext) -> Result<Self, AuthError> {
        Self::mount_with(context, "admin-blogs", context.catalog().admin_blogs())
    }
}

pub type MessagesPage = AdminListPage<ContactMessage>;

impl AdminListPage<ContactMessage> {
    pub fn messages(context: &AppContext) -> Result<Self, AuthError> {
        Self::mount_with(context, "admin-messages", context.catalog().messages())
    }

    pub fn unread(&self) -> usize {
        self.rows().iter().filter(|message| !message.is_read).count()
    }
}
