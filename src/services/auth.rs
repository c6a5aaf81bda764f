// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication and session lifecycle.
//!
//! A refresh token is `Issued` until it is rotated by `refresh`, revoked by
//! `sign_out` or a bulk revocation, or expires. Every state but `Issued`
//! means the token is gone from the session store.

use crate::config::{Config, Deadlines, RecoveryTokenPolicy};
use crate::db::{ConflictField, DbError, UserRepository, UserTx};
use crate::error::{AuthError, Result};
use crate::models::auth::{
    normalize_email, validate_password_strength, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN,
};
use crate::models::{
    AuthUser, Credential, RecoveryTicket, SignInRequest, SignUpRequest, TokenPair, User,
    UserProfile,
};
use crate::services::avatar;
use crate::services::events::{DomainEvent, EventQueue};
use crate::services::media::MediaService;
use crate::services::password::PasswordService;
use crate::services::token::{TokenError, TokenIssuer};
use crate::session::SessionStore;
use crate::time_utils::format_utc_rfc3339;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

const REFRESH_TOKEN_BYTES: usize = 32;

/// Lifetimes and policies of the auth service.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub refresh_ttl: Duration,
    pub recovery_ttl: Duration,
    pub recovery_policy: RecoveryTokenPolicy,
    pub deadlines: Deadlines,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_ttl: config.refresh_ttl,
            recovery_ttl: config.recovery_ttl,
            recovery_policy: config.recovery_policy,
            deadlines: config.deadlines,
        }
    }
}

/// Run `fut` under `limit`, turning an elapsed deadline into an error.
pub(crate) async fn with_deadline<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(op, limit_ms = limit.as_millis() as u64, "Operation deadline exceeded");
            Err(AuthError::DeadlineExceeded(limit))
        }
    }
}

/// 32 random bytes, base64url without padding (43 characters).
fn new_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn validate_new_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    validate_password_strength(password)
        .map_err(|_| AuthError::Validation("password must contain a letter and a digit".into()))
}

fn signing_error(err: TokenError) -> AuthError {
    AuthError::Crypto(format!("access token signing failed: {err}"))
}

fn commit_error(err: DbError) -> AuthError {
    match err {
        DbError::Conflict(ConflictField::Email) => AuthError::EmailAlreadyUsed,
        DbError::Conflict(ConflictField::Username) => AuthError::UsernameAlreadyUsed,
        other => AuthError::Database(other),
    }
}

fn missing_user(err: DbError) -> AuthError {
    match err {
        DbError::NotFound => AuthError::UserNotFound,
        other => AuthError::Database(other),
    }
}

/// Orchestrates users, sessions, tokens, media and events.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionStore>,
    media: Arc<dyn MediaService>,
    events: EventQueue,
    tokens: TokenIssuer,
    passwords: PasswordService,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        media: Arc<dyn MediaService>,
        events: EventQueue,
        tokens: TokenIssuer,
        passwords: PasswordService,
        settings: AuthSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            media,
            events,
            tokens,
            passwords,
            settings,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.settings.refresh_ttl
    }

    pub fn access_ttl(&self) -> Duration {
        self.tokens.access_ttl()
    }

    // ─── Sign-up ─────────────────────────────────────────────────

    /// Create an account with a generated avatar. Returns the public profile.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<UserProfile> {
        with_deadline(
            self.settings.deadlines.sign_up,
            "sign_up",
            self.sign_up_inner(request),
        )
        .await
    }

    async fn sign_up_inner(&self, mut request: SignUpRequest) -> Result<UserProfile> {
        request.normalize();
        request.validate()?;

        if self.users.exists_by_email(&request.email).await? {
            return Err(AuthError::EmailAlreadyUsed);
        }
        if self.users.exists_by_username(&request.username).await? {
            return Err(AuthError::UsernameAlreadyUsed);
        }

        let mut tx = self.users.begin_tx().await?;
        let user = match self.stage_user(&request, tx.as_mut()).await {
            Ok(user) => user,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Sign-up rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await.map_err(commit_error)?;

        tracing::info!(user_id = %user.id, username = %user.username, "User signed up");

        self.events.enqueue(DomainEvent::UserCreated {
            user_id: user.id,
            username: user.username.clone(),
            email: user.credential.email.clone(),
            created_at: user.created_at.clone(),
        });

        Ok(UserProfile::from(&user))
    }

    /// Write the user row and avatar into `tx`. Nothing is visible until
    /// commit, except the avatar object itself.
    async fn stage_user(&self, request: &SignUpRequest, tx: &mut dyn UserTx) -> Result<User> {
        let password_hash = self.passwords.hash(&request.password).await?;

        let mut user = User {
            id: Uuid::new_v4(),
            username: request.username.clone(),
            bio: request.bio.clone(),
            gender: request.gender,
            created_at: format_utc_rfc3339(chrono::Utc::now()),
            is_superuser: false,
            credential: Credential {
                email: request.email.clone(),
                password_hash,
            },
            avatar: None,
        };
        tx.create_user(&user)?;

        let image = avatar::generate(&user.username, user.gender);
        let url = self
            .media
            .upload_avatar_tx(user.id, &image.bytes, &image.filename, tx)
            .await?;
        user.avatar = Some(url);

        Ok(user)
    }

    // ─── Sessions ────────────────────────────────────────────────

    /// Exchange credentials for a token pair. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<TokenPair> {
        with_deadline(
            self.settings.deadlines.default,
            "sign_in",
            self.sign_in_inner(request),
        )
        .await
    }

    async fn sign_in_inner(&self, request: SignInRequest) -> Result<TokenPair> {
        let email = normalize_email(&request.email);

        let Some(user) = self.users.get_user_by_email(&email).await? else {
            self.passwords.verify_dummy(&request.password).await?;
            tracing::warn!("Sign-in rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .passwords
            .verify(&request.password, &user.credential.password_hash)
            .await?
        {
            tracing::warn!(user_id = %user.id, "Sign-in rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.issue_pair(&user).await?;
        tracing::info!(user_id = %user.id, "User signed in");
        Ok(pair)
    }

    /// Rotate a refresh token. The presented token is consumed before the
    /// new pair exists, so a replay always fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        with_deadline(
            self.settings.deadlines.default,
            "refresh",
            self.refresh_inner(refresh_token),
        )
        .await
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<TokenPair> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let Some(user_id) = self.sessions.consume_refresh(refresh_token).await? else {
            tracing::warn!("Refresh rejected: unknown or reused token");
            return Err(AuthError::InvalidRefreshToken);
        };

        let Some(user) = self.users.get_user_by_id(user_id).await? else {
            tracing::warn!(user_id = %user_id, "Refresh rejected: user no longer exists");
            return Err(AuthError::SessionUserGone);
        };

        let pair = self.issue_pair(&user).await?;
        tracing::debug!(user_id = %user.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke one refresh token. Unknown tokens are fine.
    pub async fn sign_out(&self, refresh_token: &str) -> Result<()> {
        with_deadline(self.settings.deadlines.default, "sign_out", async {
            if !refresh_token.is_empty() {
                self.sessions.remove_refresh(refresh_token).await?;
            }
            Ok(())
        })
        .await
    }

    async fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        let access_token = self
            .tokens
            .issue_access(user.id, user.email(), user.role())
            .map_err(signing_error)?;

        let refresh_token = new_refresh_token();
        self.sessions
            .store_refresh(&refresh_token, user.id, self.settings.refresh_ttl)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_ttl().as_secs(),
            refresh_expires_in: self.settings.refresh_ttl.as_secs(),
        })
    }

    /// Check an access token and return the identity it carries.
    pub fn verify_access_token(&self, token: &str) -> Result<AuthUser> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(AuthError::InvalidAccessToken)?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        })
    }

    // ─── Passwords ───────────────────────────────────────────────

    /// Change a password after checking the current one. Every session of
    /// the user is closed.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        with_deadline(self.settings.deadlines.password, "update_password", async {
            validate_new_password(new_password)?;

            let user = self
                .users
                .get_user_by_id(user_id)
                .await?
                .ok_or(AuthError::UserNotFound)?;

            if !self
                .passwords
                .verify(old_password, &user.credential.password_hash)
                .await?
            {
                tracing::warn!(user_id = %user_id, "Password update rejected: wrong password");
                return Err(AuthError::InvalidPassword);
            }

            let closed = self.sessions.close_all_sessions(user_id).await?;
            let hash = self.passwords.hash(new_password).await?;
            self.users
                .update_user_password(user_id, &hash)
                .await
                .map_err(missing_user)?;

            tracing::info!(user_id = %user_id, closed, "Password updated, sessions revoked");
            Ok(())
        })
        .await
    }

    /// Start account recovery: revoke all sessions and mint a recovery token
    /// for out-of-band delivery.
    pub async fn forgot_password(&self, email: &str) -> Result<RecoveryTicket> {
        with_deadline(self.settings.deadlines.password, "forgot_password", async {
            let email = normalize_email(email);
            let user = self
                .users
                .get_user_by_email(&email)
                .await?
                .ok_or(AuthError::UserNotFound)?;

            let closed = self.sessions.close_all_sessions(user.id).await?;

            let token = Uuid::new_v4().to_string();
            self.sessions
                .store_recovery(&token, user.id, self.settings.recovery_ttl)
                .await?;

            tracing::info!(user_id = %user.id, closed, "Recovery token issued, sessions revoked");

            Ok(RecoveryTicket {
                user_id: user.id,
                email: user.credential.email,
                token,
                expires_in: self.settings.recovery_ttl.as_secs(),
            })
        })
        .await
    }

    /// Queue a recovery ticket for delivery to its owner.
    pub fn notify_recovery(&self, ticket: &RecoveryTicket) {
        self.events.enqueue(DomainEvent::RecoveryRequested {
            user_id: ticket.user_id,
            email: ticket.email.clone(),
            token: ticket.token.clone(),
            expires_in: ticket.expires_in,
        });
    }

    /// Set a new password using a recovery token.
    pub async fn recovery_password(&self, token: &str, new_password: &str) -> Result<()> {
        with_deadline(self.settings.deadlines.password, "recovery_password", async {
            validate_new_password(new_password)?;

            let owner = match self.settings.recovery_policy {
                RecoveryTokenPolicy::ReusableUntilExpiry => {
                    self.sessions.lookup_user_by_recovery(token).await?
                }
                RecoveryTokenPolicy::SingleUse => self.sessions.consume_recovery(token).await?,
            };
            let Some(user_id) = owner else {
                tracing::warn!("Recovery rejected: unknown or expired token");
                return Err(AuthError::InvalidRecoveryToken);
            };

            let hash = self.passwords.hash(new_password).await?;
            self.users
                .update_user_password(user_id, &hash)
                .await
                .map_err(missing_user)?;

            tracing::info!(user_id = %user_id, "Password reset via recovery token");
            Ok(())
        })
        .await
    }

    // ─── Account ─────────────────────────────────────────────────

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserProfile> {
        with_deadline(self.settings.deadlines.default, "get_user", async {
            let user = self
                .users
                .get_user_by_id(user_id)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            Ok(UserProfile::from(&user))
        })
        .await
    }

    /// Close every session, then delete the user row.
    pub async fn delete_account(&self, user_id: Uuid) -> Result<()> {
        with_deadline(self.settings.deadlines.default, "delete_account", async {
            let closed = self.sessions.close_all_sessions(user_id).await?;
            self.users.delete_user(user_id).await.map_err(missing_user)?;
            tracing::info!(user_id = %user_id, closed, "Account deleted");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_43_url_safe_chars() {
        let a = new_refresh_token();
        let b = new_refresh_token();
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, b);
    }

    #[test]
    fn new_password_rules() {
        assert!(validate_new_password("Password1").is_ok());
        assert!(matches!(
            validate_new_password("short1"),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            validate_new_password("onlyletters"),
            Err(AuthError::Validation(_))
        ));
        assert!(validate_new_password(&"a1".repeat(65)).is_err());
    }

    #[test]
    fn commit_conflicts_map_to_field_errors() {
        assert!(matches!(
            commit_error(DbError::Conflict(ConflictField::Email)),
            AuthError::EmailAlreadyUsed
        ));
        assert!(matches!(
            commit_error(DbError::Conflict(ConflictField::Username)),
            AuthError::UsernameAlreadyUsed
        ));
        assert!(matches!(
            commit_error(DbError::Backend("x".into())),
            AuthError::Database(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_elapses() {
        let result: Result<()> = with_deadline(Duration::from_secs(1), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AuthError::DeadlineExceeded(d)) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let result = with_deadline(Duration::from_secs(1), "fast", async {
            Err::<(), _>(AuthError::UserNotFound)
        })
        .await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }
}
