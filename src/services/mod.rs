// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod avatar;
pub mod events;
pub mod media;
pub mod password;
pub mod token;

pub use auth::{AuthService, AuthSettings};
pub use events::{
    DomainEvent, EnqueueOutcome, EventPublisher, EventQueue, HttpPublisher, LogPublisher,
    PublishError,
};
pub use media::{
    AvatarUploader, FsObjectStore, MediaError, MediaService, MemoryObjectStore, ObjectStore,
};
pub use password::{Argon2Config, PasswordService};
pub use token::{AccessClaims, TokenError, TokenIssuer};
