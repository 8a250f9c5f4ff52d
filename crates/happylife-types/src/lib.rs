//! Shared record and payload types for the HappyLifeNepal data layer.
//!
//! Read records mirror the backend rows; write payloads carry only the
//! fields a client is allowed to send. Store-assigned columns (`id`,
//! `created_at`, `updated_at`) never appear on payloads.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use uuid::Uuid;

/// Backend collections (tables) the site reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    #[serde(rename = "about_us")]
    About,
    Donations,
    Events,
    Blogs,
    #[serde(rename = "contact_messages")]
    Messages,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::About,
        Collection::Donations,
        Collection::Events,
        Collection::Blogs,
        Collection::Messages,
    ];

    /// Backend table name.
    pub fn table(self) -> &'static str {
        match self {
            Collection::About => "about_us",
            Collection::Donations => "donations",
            Collection::Events => "events",
            Collection::Blogs => "blogs",
            Collection::Messages => "contact_messages",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.table() == table)
    }

    /// Contact messages are never edited, so they carry no `updated_at`.
    pub fn tracks_updates(self) -> bool {
        !matches!(self, Collection::Messages)
    }

    /// Whether anonymous clients may insert rows.
    pub fn accepts_public_inserts(self) -> bool {
        matches!(self, Collection::Messages)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Error returned when parsing an unknown collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCollection(pub String);

impl fmt::Display for UnknownCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown collection `{}`", self.0)
    }
}

impl std::error::Error for UnknownCollection {}

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let found = match normalized.as_str() {
            "about" | "about_us" | "about-us" => Some(Collection::About),
            "donation" | "donations" => Some(Collection::Donations),
            "event" | "events" => Some(Collection::Events),
            "blog" | "blogs" => Some(Collection::Blogs),
            "message" | "messages" | "contact_messages" | "contact-messages" => {
                Some(Collection::Messages)
            }
            _ => None,
        };
        found.ok_or_else(|| UnknownCollection(value.to_string()))
    }
}

/// A row type stored in a backend collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;
}

/// A write payload targeting a backend collection.
pub trait Payload: Serialize + Send + Sync {
    const COLLECTION: Collection;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub target_amount: f64,
    pub current_amount: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Donation {
    /// Funding progress as a whole percentage, capped at 100.
    pub fn progress_percent(&self) -> u8 {
        if self.target_amount <= 0.0 {
            return 0;
        }
        let ratio = (self.current_amount / self.target_amount) * 100.0;
        ratio.round().clamp(0.0, 100.0) as u8
    }
}

impl Record for Donation {
    const COLLECTION: Collection = Collection::Donations;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub event_date: OffsetDateTime,
    pub location: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub is_featured: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Event {
    /// Upcoming/past is decided against the caller's clock at render time.
    pub fn is_upcoming(&self, now: OffsetDateTime) -> bool {
        self.event_date > now
    }
}

impl Record for Event {
    const COLLECTION: Collection = Collection::Events;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Record for Blog {
    const COLLECTION: Collection = Collection::Blogs;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboutUs {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub vision: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Record for AboutUs {
    const COLLECTION: Collection = Collection::About;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Record for ContactMessage {
    const COLLECTION: Collection = Collection::Messages;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationInput {
    pub title: String,
    pub description: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub image_url: Option<String>,
    pub is_active: bool,
}

impl Payload for DonationInput {
    const COLLECTION: Collection = Collection::Donations;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub event_date: OffsetDateTime,
    pub location: String,
    pub image_url: Option<String>,
    pub is_featured: bool,
}

impl Payload for EventInput {
    const COLLECTION: Collection = Collection::Events;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogInput {
    pub title: String,
    pub content: String,
    pub author: String,
    pub image_url: Option<String>,
    pub is_published: bool,
}

impl Payload for BlogInput {
    const COLLECTION: Collection = Collection::Blogs;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboutInput {
    pub title: String,
    pub content: String,
    pub mission: Option<String>,
    pub vision: Option<String>,
    pub image_url: Option<String>,
}

impl Payload for AboutInput {
    const COLLECTION: Collection = Collection::About;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

impl Payload for ContactInput {
    const COLLECTION: Collection = Collection::Messages;
}

/// Partial update flipping a message's read flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRead {
    pub is_read: bool,
}

impl Payload for MarkRead {
    const COLLECTION: Collection = Collection::Messages;
}

/// Admin dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_donations: u64,
    pub active_donations: u64,
    pub total_events: u64,
    pub total_blogs: u64,
    pub published_blogs: u64,
    pub total_messages: u64,
    pub unread_messages: u64,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn donation(target: f64, current: f64) -> Donation {
        Donation {
            id: Uuid::new_v4(),
            title: "Clean Water".into(),
            description: "Wells for villages".into(),
            target_amount: target,
            current_amount: current,
            image_url: None,
            is_active: true,
            created_at: datetime!(2024-01-01 0:00 UTC),
            updated_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn progress_rounds_and_caps() {
        assert_eq!(donation(5000.0, 3200.0).progress_percent(), 64);
        assert_eq!(donation(3000.0, 2100.0).progress_percent(), 70);
        assert_eq!(donation(3.0, 2.0).progress_percent(), 67);
        assert_eq!(donation(100.0, 250.0).progress_percent(), 100);
        assert_eq!(donation(0.0, 10.0).progress_percent(), 0);
    }

    #[test]
    fn collection_names_round_trip_through_tables() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_table(collection.table()), Some(collection));
        }
        assert_eq!("messages".parse::<Collection>(), Ok(Collection::Messages));
        assert!("users".parse::<Collection>().is_err());
    }

    #[test]
    fn blog_rows_tolerate_missing_optional_fields() {
        let raw = serde_json::json!({
            "id": "7f1c5a7e-2b7d-4c1e-9a57-3f1a1d1b2c3d",
            "title": "Hello",
            "content": "Body",
            "author": "Sita",
            "is_published": true,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00+00:00"
        });
        let blog: Blog = serde_json::from_value(raw).expect("blog row");
        assert!(blog.image_url.is_none());
        assert!(blog.published_at.is_none());
    }

    #[test]
    fn upcoming_compares_against_now() {
        let event = Event {
            id: Uuid::new_v4(),
            title: "Health camp".into(),
            description: "Free checkups".into(),
            event_date: datetime!(2025-06-01 9:00 UTC),
            location: "Pokhara".into(),
            image_url: None,
            is_featured: false,
            created_at: datetime!(2025-01-01 0:00 UTC),
            updated_at: datetime!(2025-01-01 0:00 UTC),
        };
        assert!(event.is_upcoming(datetime!(2025-05-31 0:00 UTC)));
        assert!(!event.is_upcoming(datetime!(2025-06-01 9:00 UTC)));
    }
}
