use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The server refused the request; the message is shown as-is.
    #[error("{0}")]
    Rejected(String),

    #[error("Server did not return a token")]
    MissingToken,

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            // Transport problems and unparseable bodies carry no server message
            ApiError::NetworkError(_) | ApiError::InvalidResponse(_) => AuthError::Api(err),
            other => AuthError::Rejected(other.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_server_message_is_verbatim() {
        let api = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid email or password"}"#);
        let err = AuthError::from(api);
        assert_eq!(err.to_string(), "Invalid email or password");

        let api = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message":"Email already in use"}"#);
        assert_eq!(AuthError::from(api).to_string(), "Email already in use");

        let api = ApiError::InvalidResponse("expected value at line 1".to_string());
        assert!(matches!(AuthError::from(api), AuthError::Api(_)));
    }
}
