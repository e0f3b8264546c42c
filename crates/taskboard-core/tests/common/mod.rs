//! Shared fixtures for the auth integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use taskboard_core::api::ApiClient;
use taskboard_core::auth::{AuthOptions, AuthProvider, AuthRecord, KeyValueStore, MemoryStore, SessionVerdict};
use taskboard_core::models::{User, UserId};
use wiremock::MockServer;

/// Unsigned JWT whose `exp` is `offset` from now
pub fn token_expiring_in(offset: Duration) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({ "sub": "42", "exp": (Utc::now() + offset).timestamp() });
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, claims)
}

pub fn user() -> User {
    User {
        id: UserId::Int(42),
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        role: "manager".to_string(),
    }
}

pub fn user_json() -> Value {
    json!({ "id": 42, "name": "Ada Lovelace", "email": "ada@example.com", "role": "manager" })
}

/// A mock API plus a pair of stores that outlive any one provider, so a
/// second `provider()` behaves like a page reload.
pub struct Harness {
    pub server: MockServer,
    pub durable: MemoryStore,
    pub session: MemoryStore,
    pub options: AuthOptions,
    pub timeout: Option<StdDuration>,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            durable: MemoryStore::new(),
            session: MemoryStore::new(),
            options: AuthOptions::default(),
            timeout: None,
        }
    }

    pub fn provider(&self) -> AuthProvider {
        let api = match self.timeout {
            Some(timeout) => {
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .expect("reqwest client");
                ApiClient::with_client(client, self.server.uri())
            }
            None => ApiClient::new(self.server.uri()).expect("api client"),
        };
        AuthProvider::new(
            api,
            Arc::new(self.durable.clone()),
            Arc::new(self.session.clone()),
            self.options.clone(),
        )
    }

    /// Write a durable record as a previous run would have left it
    pub fn seed_credential(&self, token: &str, user: Option<User>) {
        let record = AuthRecord::new(token, user);
        self.durable
            .set("auth", &serde_json::to_string(&record).expect("serialize"))
            .expect("seed credential");
    }

    pub fn seed_verdict(&self, authenticated: bool, token: &str, age: Duration) {
        let verdict = SessionVerdict::new(authenticated, Some(token.to_string()), Utc::now() - age);
        self.session
            .set("auth_cache", &serde_json::to_string(&verdict).expect("serialize"))
            .expect("seed verdict");
    }

    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    pub fn stores_empty(&self) -> bool {
        self.durable.is_empty() && self.session.is_empty()
    }
}
