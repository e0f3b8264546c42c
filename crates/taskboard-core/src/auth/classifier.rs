//! Deciding whether a failed request means the session is over.
//!
//! Only a 401 from an `/auth/...` endpoint ends the session. A 401 or 403
//! from a resource endpoint ("not allowed to edit this task") is a
//! permission problem and is passed back to the caller untouched.

use reqwest::Url;
use serde::Serialize;
use tracing::info;

use crate::api::ApiError;

use super::provider::AuthProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ForceLogout,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthErrorOutcome {
    pub logout: bool,
}

/// Path of `endpoint` relative to the API base, with query and fragment
/// removed. Accepts absolute URLs and bare paths.
pub fn endpoint_path(base_url: &str, endpoint: &str) -> String {
    let path = match Url::parse(endpoint) {
        Ok(url) => url.path().to_string(),
        Err(_) => endpoint.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let path = if path.starts_with('/') { path } else { format!("/{}", path) };

    let base_path = Url::parse(base_url)
        .map(|url| url.path().trim_end_matches('/').to_string())
        .unwrap_or_default();
    if base_path.is_empty() {
        return path;
    }
    match path.strip_prefix(&base_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => path,
    }
}

pub fn is_auth_endpoint(path: &str) -> bool {
    path == "/auth" || path.starts_with("/auth/")
}

pub fn classify(path: &str, error: &ApiError) -> Disposition {
    if error.is_unauthorized() && is_auth_endpoint(path) {
        Disposition::ForceLogout
    } else {
        Disposition::PassThrough
    }
}

impl AuthProvider {
    /// Hook for the request layer: call with any failed request. When the
    /// outcome says `logout`, the session has already been cleared and the
    /// caller should route to `logout()` for the redirect.
    pub fn on_auth_error(&self, endpoint: &str, error: &ApiError) -> AuthErrorOutcome {
        let path = endpoint_path(self.api().base_url(), endpoint);
        match classify(&path, error) {
            Disposition::ForceLogout => {
                info!(endpoint = %path, "Credential rejected by auth endpoint, clearing session");
                self.lock_state().clear_all();
                AuthErrorOutcome { logout: true }
            }
            Disposition::PassThrough => AuthErrorOutcome { logout: false },
        }
    }
}
