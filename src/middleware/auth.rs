// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token authentication middleware.

use crate::error::AuthError;
use crate::services::TokenError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie carrying the access token for browser clients.
pub const ACCESS_COOKIE: &str = "roost_access";

/// Middleware that requires a valid access token and stores the caller's
/// [`AuthUser`](crate::models::AuthUser) in request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // Header first, then cookie
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    let token = bearer
        .or_else(|| jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAccessToken(TokenError::Malformed))?;

    let auth_user = state.auth.verify_access_token(&token).inspect_err(|e| {
        tracing::debug!(error = ?e, "Access token rejected");
    })?;

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
