//! Durable storage for the bearer token and the last-known identity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::User;

use super::store::{KeyValueStore, Slot, StorageError};

/// Key of the durable `{token, user}` record
pub const AUTH_KEY: &str = "auth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl AuthRecord {
    pub fn new(token: impl Into<String>, user: Option<User>) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

/// Token and identity, persisted as one record so they are always
/// replaced together.
#[derive(Debug)]
pub struct CredentialStore {
    slot: Slot<AuthRecord>,
}

impl CredentialStore {
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            slot: Slot::open(AUTH_KEY, backend),
        }
    }

    /// False when there is no storage environment behind this store
    pub fn is_attached(&self) -> bool {
        self.slot.is_attached()
    }

    pub fn record(&self) -> Option<&AuthRecord> {
        self.slot.get()
    }

    pub fn token(&self) -> Option<&str> {
        self.record().map(|r| r.token.as_str())
    }

    /// Stored identity, regardless of whether the token is still good
    pub fn stored_identity(&self) -> Option<&User> {
        self.record().and_then(|r| r.user.as_ref())
    }

    /// Re-read the record another provider may have replaced or cleared
    pub fn reload(&mut self) {
        self.slot.reload();
    }

    pub fn holds(&self, token: &str) -> bool {
        self.token() == Some(token)
    }

    pub fn save(&mut self, record: AuthRecord) -> Result<(), StorageError> {
        self.slot.put(record)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.slot.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryStore, NoStorage};
    use crate::models::UserId;

    fn user() -> User {
        User {
            id: UserId::Int(1),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: "admin".to_string(),
        }
    }

    #[test]
    fn test_record_survives_reopen() {
        let backend = MemoryStore::new();
        let mut store = CredentialStore::open(Arc::new(backend.clone()));
        assert_eq!(store.token(), None);

        store.save(AuthRecord::new("t1", Some(user()))).expect("save");

        let reopened = CredentialStore::open(Arc::new(backend.clone()));
        assert_eq!(reopened.token(), Some("t1"));
        assert_eq!(reopened.stored_identity().map(|u| u.name.as_str()), Some("Ada"));
        assert!(reopened.holds("t1"));
        assert!(!reopened.holds("t2"));
    }

    #[test]
    fn test_clear_removes_token_and_identity() {
        let backend = MemoryStore::new();
        let mut store = CredentialStore::open(Arc::new(backend.clone()));
        store.save(AuthRecord::new("t1", Some(user()))).expect("save");

        store.clear().expect("clear");
        assert_eq!(store.record(), None);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_detached_store_keeps_memory_copy() {
        let mut store = CredentialStore::open(Arc::new(NoStorage));
        assert!(!store.is_attached());
        assert!(store.save(AuthRecord::new("t1", None)).is_ok());
        assert_eq!(store.token(), Some("t1"));
    }
}
