//! Authentication module for the client session.
//!
//! This module provides:
//! - `AuthProvider`: validator, login/logout/register, error hook
//! - `CredentialStore`: durable token + identity record
//! - `SessionCache`: verdict cache, trusted for 5 minutes per token
//! - `token`: local expiry decoding of JWT bearer tokens
//! - `store`: memory, file, keychain and detached storage backends

pub mod cache;
pub mod classifier;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
mod validator;

pub use cache::{SessionCache, SessionVerdict, VERDICT_TTL_MINUTES};
pub use classifier::{AuthErrorOutcome, Disposition};
pub use credentials::{AuthRecord, CredentialStore};
pub use error::AuthError;
pub use provider::{AuthEvent, AuthOptions, AuthProvider, AuthStatus, CheckState};
pub use session::LoginOutcome;
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, NoStorage, StorageError};
pub use token::{decode_expiry, DecodeError};
