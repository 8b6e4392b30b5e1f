//! In-memory HTTP sessions.
//!
//! Sessions are keyed by a random id carried in the `SELFPASSID` cookie.
//! A session idle for longer than the configured timeout is dropped on
//! next access or by the background reaper, whichever comes first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use selfpass_core::time::TimeDuration;
use selfpass_core::util;

use crate::directory::UserAccount;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "SELFPASSID";

/// Progress of the one-time session verification round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Waiting for the browser to return with this token.
    Pending(String),
    Verified,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub verification: Verification,
    /// The authenticated user, once a strategy has succeeded.
    pub user: Option<UserAccount>,
    /// Set by a successful configuration login.
    pub config_authenticated: bool,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl Session {
    fn is_idle(&self, timeout: TimeDuration, now: DateTime<Utc>) -> bool {
        TimeDuration::between(self.last_access, now).is_longer_than(timeout)
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}

/// Wrapper placed in request extensions by the session filter.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session. Unverified sessions get a fresh verification token.
    pub async fn create(&self, verified: bool) -> Session {
        let now = Utc::now();
        let session = Session {
            id: util::random_token(),
            verification: if verified {
                Verification::Verified
            } else {
                Verification::Pending(util::random_token())
            },
            user: None,
            config_authenticated: false,
            created: now,
            last_access: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        tracing::debug!(verified, "session created");
        session
    }

    /// Look up a session and record the access. Idle sessions are removed
    /// and reported as absent.
    pub async fn touch(&self, id: &str, idle_timeout: TimeDuration) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        if session.is_idle(idle_timeout, now) {
            sessions.remove(id);
            tracing::debug!("idle session discarded on access");
            return None;
        }
        session.last_access = now;
        Some(session.clone())
    }

    /// Apply `f` to a session, returning the updated copy.
    pub async fn update(&self, id: &str, f: impl FnOnce(&mut Session)) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        f(session);
        Some(session.clone())
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop every session idle longer than `idle_timeout`. Returns how many
    /// were removed.
    pub async fn evict_idle(&self, idle_timeout: TimeDuration) -> usize {
        self.evict_idle_at(idle_timeout, Utc::now()).await
    }

    async fn evict_idle_at(&self, idle_timeout: TimeDuration, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_idle(idle_timeout, now));
        before.saturating_sub(sessions.len())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
