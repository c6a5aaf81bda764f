// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod auth;
pub mod media;
pub mod user;

pub use auth::{AuthUser, RecoveryTicket, SignInRequest, SignUpRequest, TokenPair};
pub use media::MediaObject;
pub use user::{Credential, Gender, Role, User, UserProfile};
