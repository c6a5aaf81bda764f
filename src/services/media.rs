// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Avatar upload during sign-up.
//!
//! Object bytes go straight to the [`ObjectStore`]; only the metadata row is
//! written through the sign-up transaction. A rolled-back sign-up therefore
//! leaves the object behind.

use crate::db::{DbError, UserTx};
use crate::models::MediaObject;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("media metadata write failed: {0}")]
    Metadata(#[from] DbError),
}

/// Byte storage for media objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MediaError>;

    /// Public URL under which `key` is served.
    fn url_for(&self, key: &str) -> String;
}

fn join_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// Stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaError> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(MediaError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), MediaError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

/// A stored object held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Object store for tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    base_url: String,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: base_url.into(),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MediaError> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

/// Media operations used by sign-up.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Store an avatar and record its metadata in `tx`. Returns the avatar
    /// URL.
    async fn upload_avatar_tx(
        &self,
        user_id: Uuid,
        bytes: &[u8],
        filename: &str,
        tx: &mut dyn UserTx,
    ) -> Result<String, MediaError>;
}

/// Uploads avatars under `avatars/{user_id}/{filename}`.
#[derive(Clone)]
pub struct AvatarUploader {
    store: Arc<dyn ObjectStore>,
}

impl AvatarUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some("svg") => super::avatar::CONTENT_TYPE,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl MediaService for AvatarUploader {
    async fn upload_avatar_tx(
        &self,
        user_id: Uuid,
        bytes: &[u8],
        filename: &str,
        tx: &mut dyn UserTx,
    ) -> Result<String, MediaError> {
        let key = format!("avatars/{user_id}/{filename}");
        let content_type = content_type_for(filename);

        self.store.put(&key, bytes, content_type).await?;

        let object = MediaObject {
            url: self.store.url_for(&key),
            key,
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            user_id,
            created_at: format_utc_rfc3339(chrono::Utc::now()),
        };
        tx.attach_avatar(user_id, &object)?;

        tracing::debug!(user_id = %user_id, key = %object.key, "Avatar stored");
        Ok(object.url)
    }
}
