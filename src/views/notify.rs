//! Transient user-visible notifications.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::cache::lock::mutex_lock;

const TARGET: &str = "happylife::views::notify";

pub const DEFAULT_CAPACITY: usize = 5;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub title: String,
    pub text: String,
    pub ttl: Duration,
    pub shown_at: Instant,
}

impl Toast {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.shown_at) >= self.ttl
    }
}

/// Bounded toast queue. The oldest toast is dropped when full.
#[derive(Debug, Clone)]
pub struct Notifications {
    queue: Arc<Mutex<VecDeque<Toast>>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl Notifications {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn push(&self, kind: ToastKind, title: impl Into<String>, text: impl Into<String>) {
        let toast = Toast {
            kind,
            title: title.into(),
            text: text.into(),
            ttl: self.ttl,
            shown_at: Instant::now(),
        };
        match kind {
            ToastKind::Success => info!(title = %toast.title, text = %toast.text, "Notification"),
            ToastKind::Error => warn!(title = %toast.title, text = %toast.text, "Notification"),
        }

        let mut queue = mutex_lock(&self.queue, TARGET, "push");
        while queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(toast);
    }

    pub fn success(&self, title: impl Into<String>, text: impl Into<String>) {
        self.push(ToastKind::Success, title, text);
    }

    /// Error toast showing `message`, or `fallback` when the message is blank.
    pub fn failure(&self, message: &str, fallback: &str) {
        let text = if message.trim().is_empty() {
            fallback
        } else {
            message
        };
        self.push(ToastKind::Error, "Error", text);
    }

    /// Toasts still on screen, oldest first. Expired ones are discarded.
    pub fn visible(&self) -> Vec<Toast> {
        let now = Instant::now();
        let mut queue = mutex_lock(&self.queue, TARGET, "visible");
        queue.retain(|toast| !toast.is_expired(now));
        queue.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Toast> {
        self.visible().pop()
    }

    pub fn dismiss_all(&self) {
        mutex_lock(&self.queue, TARGET, "dismiss_all").clear();
    }
}
