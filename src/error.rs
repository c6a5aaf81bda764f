// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::DbError;
use crate::services::media::MediaError;
use crate::services::token::TokenError;
use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Coarse classification of failures, used by callers to pick transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; the caller's fault.
    Validation,
    /// Email or username already taken.
    Conflict,
    /// Bad credentials or an invalid/expired token.
    Authentication,
    /// A valid token was presented but its owner is gone.
    Forbidden,
    NotFound,
    Internal,
}

/// Authentication service error.
///
/// Messages are safe to show to clients: they never include password hashes
/// or token values.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Email is already in use")]
    EmailAlreadyUsed,

    #[error("Username is already in use")]
    UsernameAlreadyUsed,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    InvalidPassword,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Invalid or expired recovery token")]
    InvalidRecoveryToken,

    #[error("Invalid or expired access token")]
    InvalidAccessToken(#[source] TokenError),

    #[error("Session owner no longer exists")]
    SessionUserGone,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Session store error: {0}")]
    SessionStore(#[from] SessionError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::EmailAlreadyUsed | AuthError::UsernameAlreadyUsed => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::InvalidPassword
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidRecoveryToken
            | AuthError::InvalidAccessToken(_) => ErrorKind::Authentication,
            AuthError::SessionUserGone => ErrorKind::Forbidden,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::Database(_)
            | AuthError::SessionStore(_)
            | AuthError::Media(_)
            | AuthError::Crypto(_)
            | AuthError::DeadlineExceeded(_)
            | AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "bad_request",
            AuthError::EmailAlreadyUsed => "email_already_used",
            AuthError::UsernameAlreadyUsed => "username_already_used",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidPassword => "invalid_password",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::InvalidRecoveryToken => "invalid_recovery_token",
            AuthError::InvalidAccessToken(_) => "unauthorized",
            AuthError::SessionUserGone => "forbidden",
            AuthError::UserNotFound => "not_found",
            AuthError::Database(_) => "database_error",
            AuthError::SessionStore(_) => "session_store_error",
            AuthError::Media(_) => "media_error",
            AuthError::Crypto(_) | AuthError::DeadlineExceeded(_) | AuthError::Internal(_) => {
                "internal_error"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::Validation(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match self.kind() {
            ErrorKind::Validation => Some(self.to_string()),
            ErrorKind::Internal => {
                tracing::error!(error = %self, "Internal server error");
                None
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AuthError>;
