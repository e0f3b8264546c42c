//! The `AuthProvider` facade and the session state it guards.
//!
//! Everything the rest of the application needs from the auth subsystem
//! goes through one cloneable `AuthProvider`:
//! - `check()` (validator.rs)
//! - `login()`, `register()`, `logout()` (session.rs)
//! - `on_auth_error()` (classifier.rs)
//! - `identity()`, `subscribe()`, `settle()` (here)

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::{Config, CredentialBackend};
use crate::models::User;

use super::cache::{SessionCache, SessionVerdict};
use super::credentials::{AuthRecord, CredentialStore};
use super::store::{FileStore, KeyValueStore, KeyringStore};
use super::token;

/// Buffer for change notifications. Subscribers that fall further behind
/// than this only miss old events, they never block the sender.
const EVENT_BUFFER_SIZE: usize = 16;

/// Service name for keychain-backed credential storage
const KEYRING_SERVICE: &str = "taskboard";

pub const DEFAULT_MAX_SOFT_FAILURES: u32 = 3;

/// Tunables for the provider, usually derived from `Config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    /// Consecutive ambiguous verification failures tolerated before the
    /// optimistic path is skipped and `check()` waits for the server.
    pub max_soft_failures: u32,
    pub login_redirect: String,
    pub logout_redirect: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            max_soft_failures: DEFAULT_MAX_SOFT_FAILURES,
            login_redirect: "/".to_string(),
            logout_redirect: "/login".to_string(),
        }
    }
}

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum CheckState {
    NoCredential,
    CachedValid,
    CachedInvalid,
    LocallyExpired,
    OptimisticPendingVerify,
    RemoteVerified,
    /// Ambiguous failure; previous state preserved
    RemoteFailedSoft,
    /// Server denial corroborated locally; session cleared
    RemoteFailedHard,
    /// The credential changed while the server was being asked
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthStatus {
    pub authenticated: bool,
    pub state: CheckState,
}

impl AuthStatus {
    pub(crate) fn authenticated(state: CheckState) -> Self {
        Self {
            authenticated: true,
            state,
        }
    }

    pub(crate) fn signed_out(state: CheckState) -> Self {
        Self {
            authenticated: false,
            state,
        }
    }
}

/// Change notifications for UI components tracking "do I have a session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AuthEvent {
    LoggedIn,
    Registered,
    LoggedOut,
}

/// Credential store, verdict cache and verification bookkeeping.
/// Only ever touched under the provider's mutex, never across an await.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) credentials: CredentialStore,
    pub(crate) cache: SessionCache,
    soft_failures: u32,
    soft_failure_token: Option<String>,
    verifying: Option<String>,
}

impl SessionState {
    fn new(credentials: CredentialStore, cache: SessionCache) -> Self {
        Self {
            credentials,
            cache,
            soft_failures: 0,
            soft_failure_token: None,
            verifying: None,
        }
    }

    /// Sync both records with what is persisted right now.
    pub(crate) fn reload(&mut self) {
        self.credentials.reload();
        self.cache.reload();
    }

    /// Drop token, identity and verdict in one step.
    pub(crate) fn clear_all(&mut self) {
        if let Err(e) = self.credentials.clear() {
            debug!(error = %e, "Credential clear not persisted");
        }
        self.clear_cache();
        self.reset_soft_failures();
        self.verifying = None;
    }

    pub(crate) fn clear_cache(&mut self) {
        if let Err(e) = self.cache.clear() {
            debug!(error = %e, "Verdict clear not persisted");
        }
    }

    pub(crate) fn cache_verdict(&mut self, authenticated: bool, token: &str, now: DateTime<Utc>) {
        let verdict = SessionVerdict::new(authenticated, Some(token.to_string()), now);
        if let Err(e) = self.cache.save(verdict) {
            debug!(error = %e, "Verdict cached in memory only");
        }
    }

    /// Replace the stored identity for the current token
    pub(crate) fn store_identity(&mut self, token: &str, user: User) {
        if let Err(e) = self.credentials.save(AuthRecord::new(token, Some(user))) {
            debug!(error = %e, "Identity kept in memory only");
        }
    }

    /// Store a brand new credential with its identity and an authenticated verdict
    pub(crate) fn start_session(&mut self, token: String, user: User, now: DateTime<Utc>) {
        self.reset_soft_failures();
        self.verifying = None;
        self.cache_verdict(true, &token, now);
        if let Err(e) = self.credentials.save(AuthRecord::new(token, Some(user))) {
            debug!(error = %e, "Credential kept in memory only");
        }
    }

    pub(crate) fn soft_failures_for(&self, token: &str) -> u32 {
        if self.soft_failure_token.as_deref() == Some(token) {
            self.soft_failures
        } else {
            0
        }
    }

    pub(crate) fn record_soft_failure(&mut self, token: &str) -> u32 {
        if self.soft_failure_token.as_deref() != Some(token) {
            self.soft_failure_token = Some(token.to_string());
            self.soft_failures = 0;
        }
        self.soft_failures += 1;
        self.soft_failures
    }

    pub(crate) fn reset_soft_failures(&mut self) {
        self.soft_failures = 0;
        self.soft_failure_token = None;
    }

    /// Mark a background verification for this token as started.
    /// Returns false if one is already running for it.
    pub(crate) fn begin_verification(&mut self, token: &str) -> bool {
        if self.verifying.as_deref() == Some(token) {
            return false;
        }
        self.verifying = Some(token.to_string());
        true
    }

    pub(crate) fn finish_verification(&mut self, token: &str) {
        if self.verifying.as_deref() == Some(token) {
            self.verifying = None;
        }
    }

    /// Best answer for whatever credential is stored now, without a network call
    pub(crate) fn current_status(&self, now: DateTime<Utc>) -> AuthStatus {
        let authenticated = self
            .credentials
            .token()
            .and_then(|t| self.cache.load_for(t, now))
            .is_some_and(|v| v.authenticated);
        AuthStatus {
            authenticated,
            state: CheckState::Superseded,
        }
    }
}

struct Inner {
    api: ApiClient,
    options: AuthOptions,
    state: Mutex<SessionState>,
    events: broadcast::Sender<AuthEvent>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Session authentication for the client.
/// Clone is cheap - all clones share the same session state.
#[derive(Clone)]
pub struct AuthProvider {
    inner: Arc<Inner>,
}

impl AuthProvider {
    /// `durable` holds the credential across restarts; `session` holds the
    /// short-lived verdict cache.
    pub fn new(
        api: ApiClient,
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        options: AuthOptions,
    ) -> Self {
        let state = SessionState::new(CredentialStore::open(durable), SessionCache::open(session));
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            inner: Arc::new(Inner {
                api,
                options,
                state: Mutex::new(state),
                events,
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build a provider with the storage locations and API URL from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = ApiClient::new(config.api_base_url()).context("Failed to create API client")?;

        let durable: Arc<dyn KeyValueStore> = match config.credential_backend {
            CredentialBackend::File => Arc::new(FileStore::new(config.data_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringStore::new(KEYRING_SERVICE)),
        };
        let session: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.session_dir()?));

        Ok(Self::new(api, durable, session, config.auth_options()))
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state after syncing it with the backends, for callers that
    /// act on the stored credential.
    pub(crate) fn lock_synced(&self) -> MutexGuard<'_, SessionState> {
        let mut state = self.lock_state();
        state.reload();
        state
    }

    /// The signed-in user, or `None` when there is no credential or the
    /// credential has visibly expired.
    pub fn identity(&self) -> Option<User> {
        let state = self.lock_synced();
        let token = state.credentials.token()?;
        if token::is_expired_at(token, Utc::now()) == Some(true) {
            return None;
        }
        state.credentials.stored_identity().cloned()
    }

    /// Raw bearer token for the request layer
    pub fn token(&self) -> Option<String> {
        self.lock_synced().credentials.token().map(str::to_owned)
    }

    /// Snapshot of the cached verdict, fresh or not
    pub fn cached_verdict(&self) -> Option<SessionVerdict> {
        let state = self.lock_synced();
        let token = state.credentials.token()?;
        state.cache.previous_for(token).cloned()
    }

    /// Forget the cached verdict so the next `check()` re-derives it.
    pub fn invalidate(&self) {
        self.lock_state().clear_cache();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn track_background(&self, handle: JoinHandle<()>) {
        let mut background = self.inner.background.lock().unwrap_or_else(PoisonError::into_inner);
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Wait for every background verification started so far.
    pub async fn settle(&self) {
        let handles = {
            let mut background = self.inner.background.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *background)
        };
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Background verification task failed");
            }
        }
    }
}
