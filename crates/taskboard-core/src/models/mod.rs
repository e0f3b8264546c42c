//! Data models shared between the auth subsystem and the UI.

pub mod user;

pub use user::{User, UserId};
