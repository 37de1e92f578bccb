//! Bookmark store error types.

use shelf_auth::AuthError;
use thiserror::Error;

/// Rejected before any remote call is made.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("URL must not be empty")]
    EmptyUrl,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from PostgREST
    #[error("Supabase returned HTTP {status}: {message}")]
    Supabase { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A row that does not decode into a bookmark
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Auth error: {0}")]
    Auth(AuthError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotLoggedIn | AuthError::SessionExpired => StoreError::NotAuthenticated,
            other => StoreError::Auth(other),
        }
    }
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_not_authenticated() {
        assert!(matches!(
            StoreError::from(AuthError::NotLoggedIn),
            StoreError::NotAuthenticated
        ));
        assert!(matches!(
            StoreError::from(AuthError::NetworkUnavailable),
            StoreError::Auth(AuthError::NetworkUnavailable)
        ));
    }

    #[test]
    fn test_validation_display() {
        let err = StoreError::from(ValidationError::EmptyUrl);
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation failed: URL must not be empty");
    }
}
