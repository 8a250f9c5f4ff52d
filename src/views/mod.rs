//! Page-level state built on the query cache and the realtime bridge.
//!
//! A mounted page owns a [`ViewScope`]: its observers, its realtime channels
//! and any background task (carousel auto-advance) live exactly as long as
//! the page does.

pub mod admin;
pub mod carousel;
pub mod notify;
pub mod pages;
pub mod queries;
pub mod routes;
pub mod search;

use happylife_types::Collection;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    context::AppContext,
    realtime::{LiveInvalidation, RealtimeError},
};

pub use admin::{AdminActions, AdminResource, ImageFile};
pub use carousel::{Carousel, CarouselHandle};
pub use notify::{Notifications, Toast, ToastKind};
pub use pages::{
    AboutContent, AdminDashboardPage, AdminListPage, BlogDetailPage, DetailPage, HomePage,
    ListPage, MessagesPage,
};
pub use queries::QueryCatalog;
pub use routes::{AdminSection, Resolution, Route, resolve};
pub use search::{SearchFilter, Searchable, search};

/// Resources a mounted page holds. Dropping the scope unmounts the page.
pub struct ViewScope {
    page: &'static str,
    tasks: Vec<JoinHandle<()>>,
    live: Vec<LiveInvalidation>,
}

impl ViewScope {
    pub fn new(page: &'static str) -> Self {
        debug!(page, "View mounted");
        Self {
            page,
            tasks: Vec::new(),
            live: Vec::new(),
        }
    }

    pub fn page(&self) -> &'static str {
        self.page
    }

    /// Tie a background task to this view.
    pub fn adopt(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Open a realtime channel that invalidates `collection` while mounted.
    pub async fn live(
        &mut self,
        context: &AppContext,
        channel: &str,
        collection: Collection,
    ) -> Result<(), RealtimeError> {
        let live =
            LiveInvalidation::open(context.feed(), context.cache().clone(), channel, collection)
                .await?;
        self.live.push(live);
        Ok(())
    }

    pub fn channels(&self) -> Vec<&str> {
        self.live.iter().map(LiveInvalidation::channel).collect()
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(page = self.page, channels = self.live.len(), "View unmounted");
    }
}
