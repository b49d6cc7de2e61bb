//! Session store
//!
//! Holds at most one session per username in the `sessions` collection.
//! The active session is the most recently created fresh one; stale
//! entries stay in the collection until the next clear.

use std::sync::Arc;

use carrier::{PostageBalance, Session};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kv::KeyValueStore;

/// Key of the session collection.
pub const SESSIONS_KEY: &str = "sessions";

/// Authenticated sessions, one per username.
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Session>> {
        match self.kv.get(SESSIONS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("parsing sessions: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, sessions: &[Session]) -> Result<()> {
        let raw = serde_json::to_string(sessions)
            .map_err(|e| Error::Storage(format!("serializing sessions: {e}")))?;
        self.kv.set(SESSIONS_KEY, raw).await
    }

    /// All stored sessions. A missing collection is empty.
    pub async fn list(&self) -> Result<Vec<Session>> {
        self.load().await
    }

    /// Insert or replace the session for `username`.
    ///
    /// The stored entry is keyed by `username`; other entries are untouched.
    pub async fn set_for_username(&self, username: &str, mut session: Session) -> Result<()> {
        session.username = username.to_string();

        let _guard = self.write_lock.lock().await;
        let mut sessions = self.load().await?;
        match sessions.iter().position(|s| s.username == username) {
            Some(index) => {
                sessions[index] = session;
                let mut seen = false;
                sessions.retain(|s| {
                    if s.username != username {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => sessions.push(session),
        }
        self.save(&sessions).await?;
        debug!(username, "session stored");
        Ok(())
    }

    /// Remove the session for `username`. Returns whether one existed.
    pub async fn delete(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.load().await?;
        let before = sessions.len();
        sessions.retain(|s| s.username != username);
        let removed = sessions.len() != before;
        if removed {
            self.save(&sessions).await?;
            debug!(username, "session deleted");
        }
        Ok(removed)
    }

    /// Replace the collection with an empty one.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save(&[]).await?;
        info!("sessions cleared");
        Ok(())
    }

    /// Freshest session younger than the TTL, if any.
    pub async fn get_active(&self) -> Result<Option<Session>> {
        self.get_active_at(Utc::now()).await
    }

    pub async fn get_active_at(&self, now: DateTime<Utc>) -> Result<Option<Session>> {
        let mut sessions = self.load().await?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let active = sessions.into_iter().find(|s| s.is_fresh_at(now));
        if active.is_none() {
            debug!("no active session");
        }
        Ok(active)
    }

    /// Record a new balance for `username`'s session. Returns whether the
    /// session was still present.
    pub async fn update_balance(&self, username: &str, balance: PostageBalance) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.load().await?;
        let Some(session) = sessions.iter_mut().find(|s| s.username == username) else {
            return Ok(false);
        };
        session.apply_balance(balance);
        self.save(&sessions).await?;
        Ok(true)
    }
}
