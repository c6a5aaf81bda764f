// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Media metadata stored alongside users.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata row for an uploaded object (avatars today).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaObject {
    /// Object key in the object store, e.g. `avatars/{user_id}/alice.svg`
    pub key: String,
    /// Public URL for the object
    pub url: String,
    pub content_type: String,
    pub size: u64,
    pub user_id: Uuid,
    pub created_at: String,
}
