//! Core library for taskboard.
//!
//! This crate owns everything the client needs to answer "is the current
//! user signed in?" without flicker or redundant network traffic:
//!
//! - `auth`: credential decoding, session cache, validator, login/logout
//! - `api`: HTTP client for the `/auth` endpoints
//! - `models`: user identity types shared with the web UI
//! - `config`: on-disk configuration and storage locations

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthEvent, AuthProvider, AuthStatus, CheckState};
pub use config::Config;
pub use models::User;
