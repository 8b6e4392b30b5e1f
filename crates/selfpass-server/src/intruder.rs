//! Failed-attempt tracking for configuration logins.
//!
//! Attempts are counted per subject (the client address). Once a subject
//! reaches the configured maximum within the reset window it is locked out
//! until the window elapses. Records whose window and lockout have both
//! ended are dropped by [`IntruderTracker::prune`].

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Extensions;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use selfpass_core::time::TimeDuration;

#[derive(Debug, Clone)]
struct Record {
    attempts: u32,
    window_end: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

impl Record {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.window_end <= now && self.locked_until.is_none_or(|until| until <= now)
    }
}

#[derive(Default)]
pub struct IntruderTracker {
    records: RwLock<HashMap<String, Record>>,
}

impl std::fmt::Debug for IntruderTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntruderTracker").finish_non_exhaustive()
    }
}

/// The client address recorded by `into_make_service_with_connect_info`,
/// or `"unknown"` when the server was not started that way.
pub fn client_address(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.ip().to_string())
}

impl IntruderTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_locked(&self, subject: &str) -> bool {
        self.is_locked_at(subject, Utc::now()).await
    }

    /// Record a failure. Returns `true` if the subject is now locked.
    pub async fn mark_failed(&self, subject: &str, max_attempts: u32, reset: TimeDuration) -> bool {
        self.mark_failed_at(subject, max_attempts, reset, Utc::now()).await
    }

    pub async fn clear(&self, subject: &str) {
        self.records.write().await.remove(subject);
    }

    /// Drop records whose window and lockout have ended. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        self.prune_at(Utc::now()).await
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_stale(now));
        before - records.len()
    }

    async fn is_locked_at(&self, subject: &str, now: DateTime<Utc>) -> bool {
        let mut records = self.records.write().await;
        let Some(record) = records.get(subject) else {
            return false;
        };
        match record.locked_until {
            Some(until) if until > now => true,
            Some(_) => {
                records.remove(subject);
                tracing::info!(subject, "intruder lockout expired");
                false
            }
            None => false,
        }
    }

    async fn mark_failed_at(
        &self,
        subject: &str,
        max_attempts: u32,
        reset: TimeDuration,
        now: DateTime<Utc>,
    ) -> bool {
        let mut records = self.records.write().await;
        let record = records.entry(subject.to_owned()).or_insert(Record {
            attempts: 0,
            window_end: reset.after(now),
            locked_until: None,
        });

        if record.window_end <= now {
            record.attempts = 0;
            record.window_end = reset.after(now);
            record.locked_until = None;
        }

        record.attempts = record.attempts.saturating_add(1);
        if record.attempts >= max_attempts.max(1) {
            record.locked_until = Some(reset.after(now));
            tracing::warn!(subject, attempts = record.attempts, "intruder lockout engaged");
            true
        } else {
            tracing::debug!(subject, attempts = record.attempts, "failed attempt recorded");
            false
        }
    }
}
