//! API client for the taskboard authentication endpoints.
//!
//! This module provides the `ApiClient` struct used by the session layer to
//! log in, register, and ask the server "who am I" for a bearer token.

use std::time::Duration;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the API when no configuration overrides it
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
/// Background verification must not hang around long after the UI moved on.
const REQUEST_TIMEOUT_SECS: u64 = 15;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body returned by both login and registration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// API client for the taskboard backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Build on an existing reqwest client, sharing its connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange email and password for a token and profile
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.post(LOGIN_PATH, &LoginRequest { email, password }).await
    }

    /// Create an account; the server signs the new user in right away
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.post(REGISTER_PATH, request).await
    }

    /// Fetch the profile the given token belongs to
    pub async fn me(&self, token: &str) -> Result<User, ApiError> {
        let url = self.url(ME_PATH);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        debug!(path = ME_PATH, "Identity response received");
        Self::parse(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        debug!(path, "POST response received");
        Self::parse(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("https://tasks.example.com/api/").expect("client");
        assert_eq!(client.base_url(), "https://tasks.example.com/api");
        assert_eq!(client.url(ME_PATH), "https://tasks.example.com/api/auth/me");
    }

    #[test]
    fn test_auth_response_parses() {
        let json = r#"{"token": "a.b.c", "user": {"id": 7, "name": "Dana", "email": "dana@example.com", "role": "member"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("Failed to parse auth response JSON");
        assert_eq!(resp.token, "a.b.c");
        assert_eq!(resp.user.name, "Dana");
        assert!(resp.user.has_role("member"));
    }
}
