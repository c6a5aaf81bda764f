// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Roost: authentication and session lifecycle for the Roost social network.
//!
//! This crate issues RS256 access tokens, rotates opaque refresh tokens kept
//! in a TTL key-value store, hands out account-recovery tokens and revokes
//! sessions across devices.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod time_utils;

use config::Config;
use services::AuthService;
use session::SessionStore;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub sessions: Arc<dyn SessionStore>,
}
