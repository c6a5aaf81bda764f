// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::middleware::auth::{require_auth, ACCESS_COOKIE};
use crate::models::{AuthUser, SignInRequest, SignUpRequest, TokenPair, UserProfile};
use crate::AppState;

/// Cookie carrying the refresh token for browser clients.
pub const REFRESH_COOKIE: &str = "roost_refresh";
const REFRESH_COOKIE_PATH: &str = "/auth";

/// Routes that need no access token.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/signout", post(sign_out))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/recover", post(recover_password))
}

/// Routes that require an access token.
pub fn protected_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/password", put(update_password))
        .route("/auth/me", get(me))
        .route("/auth/account", delete(delete_account))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

/// Body for refresh and sign-out. Browser clients send the cookie instead.
#[derive(Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct RecoverPasswordRequest {
    pub token: String,
    pub new_password: String,
}

impl fmt::Debug for RecoverPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverPasswordRequest")
            .field("token", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePasswordRequest")
            .field("old_password", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AuthError::Validation(e.body_text()))
}

fn session_cookies(state: &AppState, jar: CookieJar, pair: &TokenPair) -> CookieJar {
    let secure = state.config.secure_cookies();

    let refresh = Cookie::build((REFRESH_COOKIE, pair.refresh_token.clone()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(REFRESH_COOKIE_PATH)
        .max_age(cookie_age(state.auth.refresh_ttl()));

    let access = Cookie::build((ACCESS_COOKIE, pair.access_token.clone()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(cookie_age(state.auth.access_ttl()));

    jar.add(refresh).add(access)
}

fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(REFRESH_COOKIE).path(REFRESH_COOKIE_PATH))
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
}

fn cookie_age(ttl: Duration) -> time::Duration {
    time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Refresh token from the JSON body, falling back to the cookie.
fn presented_refresh_token(jar: &CookieJar, body: &Bytes) -> Result<Option<String>> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(body)
            .map_err(|e| AuthError::Validation(format!("invalid JSON body: {e}")))?
            .refresh_token
    };

    Ok(from_body
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty()))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let request = json_body(payload)?;
    let profile = state.auth.sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: std::result::Result<Json<SignInRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<TokenPair>)> {
    let request = json_body(payload)?;
    let pair = state.auth.sign_in(request).await?;
    let jar = session_cookies(&state, jar, &pair);
    Ok((jar, Json(pair)))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<TokenPair>)> {
    let token = presented_refresh_token(&jar, &body)?.ok_or(AuthError::InvalidRefreshToken)?;
    let pair = state.auth.refresh(&token).await?;
    let jar = session_cookies(&state, jar, &pair);
    Ok((jar, Json(pair)))
}

async fn sign_out(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, StatusCode)> {
    if let Some(token) = presented_refresh_token(&jar, &body)? {
        state.auth.sign_out(&token).await?;
    }
    Ok((clear_session_cookies(jar), StatusCode::NO_CONTENT))
}

/// Always answers 202 so the endpoint cannot be used to probe for accounts.
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let request = json_body(payload)?;

    match state.auth.forgot_password(&request.email).await {
        Ok(ticket) => state.auth.notify_recovery(&ticket),
        Err(AuthError::UserNotFound) => {
            tracing::info!("Recovery requested for unknown email");
        }
        Err(e) => return Err(e),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse { status: "accepted" }),
    ))
}

async fn recover_password(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RecoverPasswordRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let request = json_body(payload)?;
    state
        .auth
        .recovery_password(&request.token, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
    payload: std::result::Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<(CookieJar, StatusCode)> {
    let request = json_body(payload)?;
    state
        .auth
        .update_password(user.user_id, &request.old_password, &request.new_password)
        .await?;
    Ok((clear_session_cookies(jar), StatusCode::NO_CONTENT))
}

async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.auth.get_user(user.user_id).await?))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    state.auth.delete_account(user.user_id).await?;
    Ok((clear_session_cookies(jar), StatusCode::NO_CONTENT))
}
