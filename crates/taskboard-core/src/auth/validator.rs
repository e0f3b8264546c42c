//! The "am I signed in?" state machine.
//!
//! Order of checks for the stored token:
//! 1. no storage environment or no token: signed out
//! 2. expiry decoded and in the past: clear everything, signed out
//! 3. fresh verdict for this exact token: reuse it
//! 4. identity on file: answer yes now, verify in the background
//! 5. otherwise ask the server and wait
//!
//! Only a 401 backed by a dead-looking token clears the session. Every
//! other failure keeps the previous answer (or yes), so an API outage
//! never logs people out.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::models::User;

use super::cache::SessionVerdict;
use super::provider::{AuthProvider, AuthStatus, CheckState, SessionState};
use super::token;

/// What a finished `/auth/me` call means for the session.
enum Outcome {
    Verified(User),
    /// Denied and the token does not look alive locally
    Denied,
    /// Anything else: denied but alive-looking, 5xx, timeout, transport
    Inconclusive(ApiError),
}

impl Outcome {
    fn classify(result: Result<User, ApiError>, token: &str, now: DateTime<Utc>) -> Self {
        match result {
            Ok(user) => Outcome::Verified(user),
            // An undecodable token has nothing to vouch for it either
            Err(e) if e.is_unauthorized() && token::is_expired_at(token, now) != Some(false) => Outcome::Denied,
            Err(e) => Outcome::Inconclusive(e),
        }
    }
}

/// The stored token unless it is missing or visibly expired, in which case
/// the state is cleaned up and the final answer returned instead.
fn live_token(state: &mut SessionState, now: DateTime<Utc>) -> Result<String, AuthStatus> {
    if !state.credentials.is_attached() {
        debug!("No storage environment, reporting signed out");
        return Err(AuthStatus::signed_out(CheckState::NoCredential));
    }

    let Some(token) = state.credentials.token().map(str::to_owned) else {
        state.clear_cache();
        return Err(AuthStatus::signed_out(CheckState::NoCredential));
    };

    match token::decode_expiry(&token) {
        Ok(expires_at) if expires_at < now => {
            info!(%expires_at, "Token expired, clearing session");
            state.clear_all();
            Err(AuthStatus::signed_out(CheckState::LocallyExpired))
        }
        Ok(_) => Ok(token),
        Err(e) => {
            debug!(error = %e, "Token not decodable locally, asking server");
            Ok(token)
        }
    }
}

impl AuthProvider {
    /// Determine whether the stored credential is good.
    ///
    /// Returns without touching the network when the answer is known
    /// locally or optimistically; waits for `/auth/me` otherwise. Never fails.
    pub async fn check(&self) -> AuthStatus {
        let now = Utc::now();
        let token = {
            let mut state = self.lock_synced();
            let token = match live_token(&mut state, now) {
                Ok(token) => token,
                Err(status) => return status,
            };

            if token::decode_expiry(&token).is_ok() {
                if let Some(verdict) = state.cache.load_for(&token, now) {
                    return if verdict.authenticated {
                        AuthStatus::authenticated(CheckState::CachedValid)
                    } else {
                        AuthStatus::signed_out(CheckState::CachedInvalid)
                    };
                }

                if self.can_answer_optimistically(&state, &token) {
                    state.cache_verdict(true, &token, now);
                    let spawn = state.begin_verification(&token);
                    drop(state);

                    if spawn {
                        self.spawn_verification(token);
                    }
                    return AuthStatus::authenticated(CheckState::OptimisticPendingVerify);
                }
            }

            token
        };

        self.verify_now(token).await
    }

    /// Drop the cached verdict and wait for the server's answer, skipping
    /// the optimistic path. Local expiry still short-circuits.
    pub async fn refresh(&self) -> AuthStatus {
        let token = {
            let mut state = self.lock_synced();
            state.clear_cache();
            match live_token(&mut state, Utc::now()) {
                Ok(token) => token,
                Err(status) => return status,
            }
        };
        self.verify_now(token).await
    }

    fn can_answer_optimistically(&self, state: &SessionState, token: &str) -> bool {
        if state.credentials.stored_identity().is_none() {
            return false;
        }
        let failures = state.soft_failures_for(token);
        if failures >= self.options().max_soft_failures {
            debug!(failures, "Too many inconclusive verifications, waiting for server");
            return false;
        }
        true
    }

    /// Awaited verification, used when no optimistic answer is possible.
    async fn verify_now(&self, token: String) -> AuthStatus {
        let result = self.api().me(&token).await;
        let now = Utc::now();
        let mut state = self.lock_synced();

        if !state.credentials.holds(&token) {
            debug!("Credential replaced during verification, discarding result");
            return state.current_status(now);
        }

        match Outcome::classify(result, &token, now) {
            Outcome::Verified(user) => {
                debug!(user = %user.id, "Session verified");
                state.store_identity(&token, user);
                state.reset_soft_failures();
                state.cache_verdict(true, &token, now);
                AuthStatus::authenticated(CheckState::RemoteVerified)
            }
            Outcome::Denied => {
                info!("Server rejected credential, clearing session");
                state.clear_all();
                AuthStatus::signed_out(CheckState::RemoteFailedHard)
            }
            Outcome::Inconclusive(e) => {
                let failures = state.record_soft_failure(&token);
                warn!(error = %e, failures, "Identity check inconclusive, keeping session");
                let authenticated = state
                    .cache
                    .previous_for(&token)
                    .map_or(true, |v| v.authenticated);
                AuthStatus {
                    authenticated,
                    state: CheckState::RemoteFailedSoft,
                }
            }
        }
    }

    fn spawn_verification(&self, token: String) {
        let provider = self.clone();
        let handle = tokio::spawn(async move {
            provider.verify_in_background(token).await;
        });
        self.track_background(handle);
    }

    /// Confirm an optimistic answer. The result only lands if the persisted
    /// token is still the one that was checked.
    async fn verify_in_background(&self, token: String) {
        let result = self.api().me(&token).await;
        let now = Utc::now();
        let mut state = self.lock_synced();
        state.finish_verification(&token);

        if !state.credentials.holds(&token) {
            debug!("Credential replaced during background verification, discarding result");
            return;
        }

        match Outcome::classify(result, &token, now) {
            Outcome::Verified(user) => {
                state.store_identity(&token, user);
                state.reset_soft_failures();
                let verdict = SessionVerdict::new(true, Some(token), now);
                match state.cache.save_if_newer(verdict) {
                    Ok(true) => debug!("Background verification confirmed session"),
                    Ok(false) => debug!("Newer verdict already cached, keeping it"),
                    Err(e) => debug!(error = %e, "Verdict cached in memory only"),
                }
            }
            Outcome::Denied => {
                info!("Server rejected credential in background, clearing session");
                state.clear_all();
            }
            Outcome::Inconclusive(e) => {
                let failures = state.record_soft_failure(&token);
                warn!(error = %e, failures, "Background identity check inconclusive, keeping session");
            }
        }
    }
}
