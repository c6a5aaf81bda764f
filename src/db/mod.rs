// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User persistence.
//!
//! Writes made during sign-up go through a [`UserTx`], which buffers them
//! and applies them together on commit.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryUserRepository;

use crate::models::{MediaObject, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Media metadata, keyed by user id
    pub const MEDIA: &str = "media";
}

/// Which unique field a write collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated on {0:?}")]
    Conflict(ConflictField),

    #[error("database backend error: {0}")]
    Backend(String),
}

/// Transactional user storage.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn begin_tx(&self) -> Result<Box<dyn UserTx>, DbError>;

    /// Look up by normalized email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError>;

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DbError>;

    /// Replace the stored password hash. Missing user → `DbError::NotFound`.
    async fn update_user_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), DbError>;

    /// Delete the user and its media metadata. Missing user → `DbError::NotFound`.
    async fn delete_user(&self, user_id: Uuid) -> Result<(), DbError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, DbError> {
        Ok(self.get_user_by_email(email).await?.is_some())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, DbError> {
        Ok(self.get_user_by_username(username).await?.is_some())
    }
}

/// A unit of work against the user store. Dropping it without `commit`
/// discards everything.
#[async_trait]
pub trait UserTx: Send {
    fn create_user(&mut self, user: &User) -> Result<(), DbError>;

    /// Record avatar metadata and point the pending user row at its URL.
    fn attach_avatar(&mut self, user_id: Uuid, media: &MediaObject) -> Result<(), DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}
