//! Explicit session context.
//!
//! The signed-in state is acquired at start, refreshed on auth events and
//! torn down on sign-out. Consumers read the current state or subscribe to
//! changes through a `tokio::sync::watch` channel.

mod rest;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use rest::RestAuth;

/// How long before expiry a session is refreshed.
pub const REFRESH_LEAD: Duration = Duration::from_secs(60);

/// Time to wait before refreshing a session that expires at `expires_at`.
pub fn refresh_delay(expires_at: OffsetDateTime, now: OffsetDateTime) -> Duration {
    (expires_at - now - REFRESH_LEAD)
        .try_into()
        .unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub email: String,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn(Session),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid login credentials: {message}")]
    InvalidCredentials { message: String },
    #[error("no active session")]
    NotSignedIn,
    #[error("auth transport error: {message}")]
    Transport { message: String },
    #[error("auth request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode auth response: {message}")]
    Decode { message: String },
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Shared handle on the current auth state.
#[derive(Clone)]
pub struct SessionContext {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::SignedIn(_))
    }

    pub fn access_token(&self) -> Option<String> {
        match &*self.state.borrow() {
            AuthState::SignedIn(session) => Some(session.access_token.clone()),
            AuthState::SignedOut => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn establish(&self, session: Session) {
        self.state.send_replace(AuthState::SignedIn(session));
    }

    pub fn clear(&self) {
        self.state.send_replace(AuthState::SignedOut);
    }
}

/// Password authentication against the backend's auth service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;
}

/// Drives an [`AuthProvider`] and keeps a [`SessionContext`] in sync with it.
#[derive(Clone)]
pub struct SessionManager {
    context: SessionContext,
    provider: Arc<dyn AuthProvider>,
}

impl SessionManager {
    pub fn new(context: SessionContext, provider: Arc<dyn AuthProvider>) -> Self {
        Self { context, provider }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in(email, password).await?;
        info!(email = %session.email, "Signed in");
        self.context.establish(session.clone());
        Ok(session)
    }

    /// Exchange the refresh token for a new session. A failed refresh signs out.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let AuthState::SignedIn(current) = self.context.current() else {
            return Err(AuthError::NotSignedIn);
        };
        match self.provider.refresh(&current).await {
            Ok(session) => {
                self.context.establish(session.clone());
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "Session refresh failed, signing out");
                self.context.clear();
                Err(err)
            }
        }
    }

    /// Revoke the session remotely when possible; the local state is always cleared.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let AuthState::SignedIn(current) = self.context.current() else {
            return Ok(());
        };
        let result = self.provider.sign_out(&current).await;
        if let Err(err) = &result {
            warn!(error = %err, "Remote sign-out failed");
        }
        self.context.clear();
        info!(email = %current.email, "Signed out");
        result
    }

    /// Refresh the session shortly before it expires, for as long as the
    /// returned task runs. Sessions without an expiry are left alone.
    pub fn keep_alive(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut changes = manager.context.subscribe();
            loop {
                let expires_at = match &*changes.borrow_and_update() {
                    AuthState::SignedIn(session) => session.expires_at,
                    AuthState::SignedOut => None,
                };
                let Some(expires_at) = expires_at else {
                    if changes.changed().await.is_err() {
                        break;
                    }
                    continue;
                };

                let wait = refresh_delay(expires_at, OffsetDateTime::now_utc());
                debug!(wait_secs = wait.as_secs(), "Scheduled session refresh");
                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        if let Err(err) = manager.refresh().await {
                            warn!(error = %err, "Scheduled session refresh failed");
                        }
                    }
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn require(&self) -> Result<Session, AuthError> {
        match self.context.current() {
            AuthState::SignedIn(session) => Ok(session),
            AuthState::SignedOut => Err(AuthError::NotSignedIn),
        }
    }
}

/// In-process provider checking a fixed credential table. Used offline and in tests.
pub struct StaticAuth {
    accounts: HashMap<String, String>,
    ttl: Option<Duration>,
}

impl StaticAuth {
    pub fn new<I, E, P>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (E, P)>,
        E: Into<String>,
        P: Into<String>,
    {
        Self {
            accounts: accounts
                .into_iter()
                .map(|(email, password)| (email.into(), password.into()))
                .collect(),
            ttl: None,
        }
    }

    /// Issue sessions that expire after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn issue(&self, email: &str) -> Session {
        Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            email: email.to_string(),
            expires_at: self.ttl.map(|ttl| OffsetDateTime::now_utc() + ttl),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        match self.accounts.get(email) {
            Some(expected) if expected == password => Ok(self.issue(email)),
            _ => Err(AuthError::InvalidCredentials {
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        Ok(self.issue(&session.email))
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }
}
