//! Client route table and the admin guard.

use std::fmt;

use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminSection {
    Dashboard,
    About,
    Donations,
    Events,
    Blogs,
    Messages,
}

impl AdminSection {
    pub const ALL: [AdminSection; 6] = [
        AdminSection::Dashboard,
        AdminSection::About,
        AdminSection::Donations,
        AdminSection::Events,
        AdminSection::Blogs,
        AdminSection::Messages,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            AdminSection::Dashboard => "dashboard",
            AdminSection::About => "about",
            AdminSection::Donations => "donations",
            AdminSection::Events => "events",
            AdminSection::Blogs => "blogs",
            AdminSection::Messages => "messages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Donations,
    Donation(Uuid),
    Events,
    Event(Uuid),
    Blogs,
    Blog(Uuid),
    Login,
    Admin(AdminSection),
}

/// Outcome of resolving a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Render(Route),
    Redirect(Route),
}

impl Route {
    /// Match a path. Unknown paths and malformed ids yield `None`.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        let id = |raw: &str| raw.parse::<Uuid>().ok();

        match segments.as_slice() {
            [] => Some(Route::Home),
            ["donations"] => Some(Route::Donations),
            ["donation", raw] => id(raw).map(Route::Donation),
            ["events"] => Some(Route::Events),
            ["event", raw] => id(raw).map(Route::Event),
            ["blogs"] => Some(Route::Blogs),
            ["blog", raw] => id(raw).map(Route::Blog),
            ["admin"] => Some(Route::Login),
            ["admin", section] => AdminSection::ALL
                .into_iter()
                .find(|candidate| candidate.slug() == *section)
                .map(Route::Admin),
            _ => None,
        }
    }

    pub fn requires_session(self) -> bool {
        matches!(self, Route::Admin(_))
    }

    /// Absolute link for sharing this page.
    pub fn share_url(self, site: &Url) -> Option<Url> {
        site.join(self.to_string().trim_start_matches('/')).ok()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Home => f.write_str("/"),
            Route::Donations => f.write_str("/donations"),
            Route::Donation(id) => write!(f, "/donation/{id}"),
            Route::Events => f.write_str("/events"),
            Route::Event(id) => write!(f, "/event/{id}"),
            Route::Blogs => f.write_str("/blogs"),
            Route::Blog(id) => write!(f, "/blog/{id}"),
            Route::Login => f.write_str("/admin"),
            Route::Admin(section) => write!(f, "/admin/{}", section.slug()),
        }
    }
}

/// Resolve a path against the route table and the current session.
///
/// Unknown paths go home; admin pages without a session go to the login view.
pub fn resolve(path: &str, signed_in: bool) -> Resolution {
    match Route::parse(path) {
        None => Resolution::Redirect(Route::Home),
        Some(route) if route.requires_session() && !signed_in => {
            Resolution::Redirect(Route::Login)
        }
        Some(route) => Resolution::Render(route),
    }
}
