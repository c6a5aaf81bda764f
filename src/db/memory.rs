// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process user repository for tests and local development.

use super::{ConflictField, DbError, UserRepository, UserTx};
use crate::models::{MediaObject, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    media: HashMap<Uuid, MediaObject>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, DbError> {
        self.tables
            .lock()
            .map_err(|_| DbError::Backend("user table lock poisoned".to_string()))
    }
}

/// User repository held in memory. Commits enforce email and username
/// uniqueness.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepository {
    inner: Arc<Inner>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with a backend error.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Media metadata stored for a user, if any.
    pub fn media_for(&self, user_id: Uuid) -> Option<MediaObject> {
        self.inner
            .lock()
            .ok()
            .and_then(|tables| tables.media.get(&user_id).cloned())
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().map(|t| t.users.len()).unwrap_or(0)
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>, DbError> {
        Ok(self.inner.lock()?.users.values().find(|u| pred(u)).cloned())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn begin_tx(&self) -> Result<Box<dyn UserTx>, DbError> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            users: Vec::new(),
            media: Vec::new(),
        }))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.find(|u| u.credential.email == email)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        self.find(|u| u.username == username)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DbError> {
        Ok(self.inner.lock()?.users.get(&user_id).cloned())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), DbError> {
        let mut tables = self.inner.lock()?;
        let user = tables.users.get_mut(&user_id).ok_or(DbError::NotFound)?;
        user.credential.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), DbError> {
        let mut tables = self.inner.lock()?;
        tables.users.remove(&user_id).ok_or(DbError::NotFound)?;
        tables.media.remove(&user_id);
        Ok(())
    }
}

struct MemoryTx {
    inner: Arc<Inner>,
    users: Vec<User>,
    media: Vec<MediaObject>,
}

#[async_trait]
impl UserTx for MemoryTx {
    fn create_user(&mut self, user: &User) -> Result<(), DbError> {
        self.users.push(user.clone());
        Ok(())
    }

    fn attach_avatar(&mut self, user_id: Uuid, media: &MediaObject) -> Result<(), DbError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(DbError::NotFound)?;
        user.avatar = Some(media.url.clone());
        self.media.push(media.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        if self.inner.fail_commits.load(Ordering::SeqCst) {
            return Err(DbError::Backend("commit rejected".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let mut tables = inner.lock()?;
        for user in &self.users {
            let clash = tables.users.values().find(|existing| {
                existing.id != user.id
                    && (existing.credential.email == user.credential.email
                        || existing.username == user.username)
            });
            if let Some(existing) = clash {
                let field = if existing.credential.email == user.credential.email {
                    ConflictField::Email
                } else {
                    ConflictField::Username
                };
                return Err(DbError::Conflict(field));
            }
        }

        let MemoryTx { users, media, .. } = *self;
        for user in users {
            tables.users.insert(user.id, user);
        }
        for object in media {
            tables.media.insert(object.user_id, object);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credential, Gender};

    fn user(username: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            bio: String::new(),
            gender: Gender::Other,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            is_superuser: false,
            credential: Credential {
                email: email.to_string(),
                password_hash: "hash".to_string(),
            },
            avatar: None,
        }
    }

    fn media(user_id: Uuid) -> MediaObject {
        MediaObject {
            key: format!("avatars/{user_id}/a.svg"),
            url: format!("http://media/avatars/{user_id}/a.svg"),
            content_type: "image/svg+xml".to_string(),
            size: 10,
            user_id,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    async fn insert(repo: &MemoryUserRepository, user: &User) -> Result<(), DbError> {
        let mut tx = repo.begin_tx().await?;
        tx.create_user(user)?;
        tx.commit().await
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let repo = MemoryUserRepository::new();
        let alice = user("alice", "alice@x.com");

        let mut tx = repo.begin_tx().await.unwrap();
        tx.create_user(&alice).unwrap();
        tx.attach_avatar(alice.id, &media(alice.id)).unwrap();
        assert!(repo.get_user_by_id(alice.id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        let stored = repo.get_user_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(stored.avatar, Some(media(alice.id).url));
        assert!(repo.media_for(alice.id).is_some());
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let repo = MemoryUserRepository::new();
        let alice = user("alice", "alice@x.com");

        let mut tx = repo.begin_tx().await.unwrap();
        tx.create_user(&alice).unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn commit_enforces_uniqueness() {
        let repo = MemoryUserRepository::new();
        insert(&repo, &user("alice", "alice@x.com")).await.unwrap();

        assert!(matches!(
            insert(&repo, &user("alice2", "alice@x.com")).await,
            Err(DbError::Conflict(ConflictField::Email))
        ));
        assert!(matches!(
            insert(&repo, &user("alice", "other@x.com")).await,
            Err(DbError::Conflict(ConflictField::Username))
        ));
        assert!(repo.exists_by_username("alice").await.unwrap());
        assert!(!repo.exists_by_email("other@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_row() {
        let repo = MemoryUserRepository::new();
        repo.fail_commits(true);

        assert!(matches!(
            insert(&repo, &user("alice", "alice@x.com")).await,
            Err(DbError::Backend(_))
        ));
        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn mutations_of_missing_user_are_not_found() {
        let repo = MemoryUserRepository::new();
        assert!(matches!(
            repo.update_user_password(Uuid::new_v4(), "h").await,
            Err(DbError::NotFound)
        ));
        assert!(matches!(
            repo.delete_user(Uuid::new_v4()).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn password_update_and_delete() {
        let repo = MemoryUserRepository::new();
        let alice = user("alice", "alice@x.com");
        insert(&repo, &alice).await.unwrap();

        repo.update_user_password(alice.id, "new-hash").await.unwrap();
        let stored = repo.get_user_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.credential.password_hash, "new-hash");

        repo.delete_user(alice.id).await.unwrap();
        assert!(repo.get_user_by_id(alice.id).await.unwrap().is_none());
    }
}
