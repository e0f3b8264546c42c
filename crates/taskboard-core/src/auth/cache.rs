//! Short-lived cache of the last authentication verdict.
//!
//! A verdict is only trusted for `VERDICT_TTL_MINUTES` and only for the
//! exact token it was computed for. The cache is persisted to the session
//! store so a reload inside the window skips the round trip.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::store::{KeyValueStore, Slot, StorageError};

/// Key of the session-scoped `{authenticated, timestamp, token}` record
pub const CACHE_KEY: &str = "auth_cache";

/// How long a verdict may be reused without asking the server.
pub const VERDICT_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionVerdict {
    pub authenticated: bool,
    pub timestamp: DateTime<Utc>,
    pub token: Option<String>,
}

impl SessionVerdict {
    pub fn new(authenticated: bool, token: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            authenticated,
            timestamp,
            token,
        }
    }

    pub fn ttl() -> Duration {
        Duration::minutes(VERDICT_TTL_MINUTES)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Younger than the TTL. A timestamp more than a TTL in the future is
    /// not clock skew, it is garbage.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age = self.age(now);
        age < Self::ttl() && age > -Self::ttl()
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token.as_deref() == Some(token)
    }
}

#[derive(Debug)]
pub struct SessionCache {
    slot: Slot<SessionVerdict>,
}

impl SessionCache {
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            slot: Slot::open(CACHE_KEY, backend),
        }
    }

    /// The current verdict if it is still inside the TTL window
    pub fn load(&self, now: DateTime<Utc>) -> Option<&SessionVerdict> {
        self.slot.get().filter(|v| v.is_fresh_at(now))
    }

    /// Fresh verdict computed for exactly this token
    pub fn load_for(&self, token: &str, now: DateTime<Utc>) -> Option<&SessionVerdict> {
        self.load(now).filter(|v| v.matches(token))
    }

    /// Last verdict for this token, however old
    pub fn previous_for(&self, token: &str) -> Option<&SessionVerdict> {
        self.slot.get().filter(|v| v.matches(token))
    }

    pub fn reload(&mut self) {
        self.slot.reload();
    }

    pub fn save(&mut self, verdict: SessionVerdict) -> Result<(), StorageError> {
        self.slot.put(verdict)
    }

    /// Last-writer-wins by timestamp: a verdict older than the one already
    /// held for the same token is dropped. Returns whether it was applied.
    pub fn save_if_newer(&mut self, verdict: SessionVerdict) -> Result<bool, StorageError> {
        let superseded = self
            .slot
            .get()
            .is_some_and(|current| current.token == verdict.token && current.timestamp > verdict.timestamp);
        if superseded {
            return Ok(false);
        }
        self.slot.put(verdict).map(|()| true)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.slot.clear()
    }
}
