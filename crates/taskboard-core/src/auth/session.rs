//! Login, registration and logout.
//!
//! Each successful mutation writes token, identity and verdict in a single
//! critical section, then emits one `AuthEvent`.

use chrono::Utc;
use tracing::info;

use crate::api::{AuthResponse, RegisterRequest};
use crate::models::User;

use super::error::AuthError;
use super::provider::{AuthEvent, AuthProvider};

/// Result of a successful login or registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: User,
    pub redirect_to: String,
}

impl AuthProvider {
    /// Sign in with email and password.
    /// Nothing is written unless the server accepts the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let response = self.api().login(email, password).await?;
        let outcome = self.establish(response)?;
        info!(user = %outcome.user.id, "Logged in");
        self.emit(AuthEvent::LoggedIn);
        Ok(outcome)
    }

    /// Create an account and sign in with it.
    pub async fn register(&self, request: &RegisterRequest) -> Result<LoginOutcome, AuthError> {
        let response = self.api().register(request).await?;
        let outcome = self.establish(response)?;
        info!(user = %outcome.user.id, "Registered");
        self.emit(AuthEvent::Registered);
        Ok(outcome)
    }

    fn establish(&self, response: AuthResponse) -> Result<LoginOutcome, AuthError> {
        let AuthResponse { token, user } = response;
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        self.lock_state().start_session(token, user.clone(), Utc::now());
        Ok(LoginOutcome {
            user,
            redirect_to: self.options().login_redirect.clone(),
        })
    }

    /// Sign out: token, identity and cached verdict go together.
    /// Returns where to send the user next.
    pub fn logout(&self) -> String {
        self.lock_state().clear_all();
        info!("Logged out");
        self.emit(AuthEvent::LoggedOut);
        self.options().logout_redirect.clone()
    }
}
