//! REST API client module for the taskboard backend.
//!
//! This module provides the `ApiClient` for the authentication endpoints
//! (`/auth/login`, `/auth/register`, `/auth/me`). Every other resource is
//! served by the generic request layer in the web UI.
//!
//! The API uses JWT bearer token authentication obtained from the login
//! or registration endpoint.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthResponse, RegisterRequest};
pub use error::ApiError;
