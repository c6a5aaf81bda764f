// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh and recovery token storage.
//!
//! Key layout shared by all backends:
//! - `refresh:{token}` → owning user id (TTL = refresh lifetime)
//! - `sessions:{user_id}` → set of that user's live refresh tokens
//! - `recovery:{token}` → user id (TTL = recovery lifetime)

pub mod memory;
pub mod redis;

pub use self::memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

pub const REFRESH_PREFIX: &str = "refresh:";
pub const SESSIONS_PREFIX: &str = "sessions:";
pub const RECOVERY_PREFIX: &str = "recovery:";

pub fn refresh_key(token: &str) -> String {
    format!("{REFRESH_PREFIX}{token}")
}

pub fn sessions_key(user_id: Uuid) -> String {
    format!("{SESSIONS_PREFIX}{user_id}")
}

pub fn recovery_key(token: &str) -> String {
    format!("{RECOVERY_PREFIX}{token}")
}

/// TTL every backend actually applies: whole seconds, at least one.
pub(crate) fn effective_ttl(ttl: Duration) -> Duration {
    Duration::from_secs(ttl.as_secs().max(1))
}

/// Session store failures. A missing key is never an error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error("corrupt value stored under {key}")]
    CorruptValue { key: String },
}

/// TTL key-value storage for refresh and recovery tokens.
///
/// Compound mutations (`consume_refresh`, `remove_refresh`,
/// `close_all_sessions`) are atomic with respect to each other on every
/// backend. A token stored concurrently with `close_all_sessions` may
/// survive it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Add `token` to the user's session set, extend the set's TTL and map
    /// the token to the user, as one batch.
    async fn store_refresh(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError>;

    async fn lookup_user_by_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError>;

    /// Atomically resolve and delete a refresh token. Of several concurrent
    /// callers presenting the same token, at most one gets `Some`.
    async fn consume_refresh(&self, token: &str) -> Result<Option<Uuid>, SessionError>;

    /// Delete a refresh token and its session-set membership. Absent tokens
    /// are a successful no-op.
    async fn remove_refresh(&self, token: &str) -> Result<(), SessionError>;

    /// Delete every refresh token of the user. Returns how many were live.
    async fn close_all_sessions(&self, user_id: Uuid) -> Result<usize, SessionError>;

    async fn store_recovery(
        &self,
        token: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), SessionError>;

    async fn lookup_user_by_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError>;

    /// Atomically resolve and delete a recovery token.
    async fn consume_recovery(&self, token: &str) -> Result<Option<Uuid>, SessionError>;

    async fn ping(&self) -> Result<(), SessionError>;
}

pub(crate) fn parse_user_id(key: &str, raw: &str) -> Result<Uuid, SessionError> {
    Uuid::parse_str(raw).map_err(|_| SessionError::CorruptValue {
        key: key.to_string(),
    })
}
