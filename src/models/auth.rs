// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request and response types for the authentication flows.

use super::user::{Gender, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Lowercase and trim an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_string()
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset")
            .with_message("username may only contain letters, digits and '_'".into()))
    }
}

/// A password must contain at least one letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_letter && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength")
            .with_message("password must contain a letter and a digit".into()))
    }
}

/// Sign-up payload.
#[derive(Clone, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 3, max = 32), custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(
        length(min = 8, max = 128),
        custom(function = "validate_password_strength")
    )]
    pub password: String,
    pub gender: Gender,
    #[serde(default)]
    #[validate(length(max = 160))]
    pub bio: String,
}

impl SignUpRequest {
    pub fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
        self.username = normalize_username(&self.username);
        self.bio = self.bio.trim().to_string();
    }
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("gender", &self.gender)
            .finish()
    }
}

/// Sign-in payload.
#[derive(Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access/refresh token pair returned by sign-in and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
}

/// Recovery token handed to the caller for out-of-band delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTicket {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_in: u64,
}

/// Authenticated identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            gender: Gender::Female,
            bio: String::new(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request("alice", "alice@x.com", "Password1").validate().is_ok());
    }

    #[test]
    fn rejects_weak_password() {
        assert!(request("alice", "alice@x.com", "password").validate().is_err());
        assert!(request("alice", "alice@x.com", "Pass1").validate().is_err());
    }

    #[test]
    fn rejects_bad_username_and_email() {
        assert!(request("al ice", "alice@x.com", "Password1").validate().is_err());
        assert!(request("al", "alice@x.com", "Password1").validate().is_err());
        assert!(request("alice", "not-an-email", "Password1").validate().is_err());
    }

    #[test]
    fn normalize_lowercases_email() {
        let mut req = request("  alice ", "  Alice@X.com ", "Password1");
        req.normalize();
        assert_eq!(req.email, "alice@x.com");
        assert_eq!(req.username, "alice");
    }

    #[test]
    fn debug_never_prints_password() {
        let req = request("alice", "alice@x.com", "Password1");
        assert!(!format!("{req:?}").contains("Password1"));
    }
}
