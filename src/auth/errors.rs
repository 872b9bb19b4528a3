use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::error::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing authorization header")]
    MissingAuthHeader,
    #[error("Authentication is not configured")]
    NotConfigured,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::MissingAuthHeader
            | AuthError::NotConfigured => ApiError::Unauthenticated,
            AuthError::InsufficientPermissions => ApiError::Forbidden,
            AuthError::Database(e) => ApiError::Database(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!("Authentication rejected: {}", self);
        ApiError::from(self).into_response()
    }
}
