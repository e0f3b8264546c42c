//! Local decoding of the bearer token's expiry.
//!
//! Tokens are JWTs: `header.claims.signature`, each segment base64url. Only
//! the `exp` claim is read, and the signature is NOT verified - the server
//! is the authority on validity, this only answers "is it obviously dead".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Reasons a token could not be decoded locally.
/// Any of these means "inconclusive, ask the server".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("expected 3 token segments, found {0}")]
    SegmentCount(usize),

    #[error("claims segment is not valid base64url")]
    InvalidBase64,

    #[error("claims segment is not a JSON object")]
    InvalidClaims,

    #[error("token has no numeric exp claim")]
    MissingExpiry,

    #[error("exp claim {0} is out of range")]
    ExpiryOutOfRange(f64),
}

/// Extract the `exp` claim of a token as a timestamp.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    // Some issuers pad their segments even though JWT says not to
    let claims = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(claims)
        .map_err(|_| DecodeError::InvalidBase64)?;

    let claims: Value = serde_json::from_slice(&bytes).map_err(|_| DecodeError::InvalidClaims)?;
    let claims = claims.as_object().ok_or(DecodeError::InvalidClaims)?;

    let exp = claims
        .get("exp")
        .and_then(Value::as_f64)
        .ok_or(DecodeError::MissingExpiry)?;

    if !exp.is_finite() {
        return Err(DecodeError::ExpiryOutOfRange(exp));
    }
    let secs = exp.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return Err(DecodeError::ExpiryOutOfRange(exp));
    }
    DateTime::from_timestamp(secs as i64, 0).ok_or(DecodeError::ExpiryOutOfRange(exp))
}

/// `Some(true)` when the token's expiry is in the past, `None` when the
/// token cannot be decoded.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> Option<bool> {
    decode_expiry(token).ok().map(|exp| exp < now)
}
