// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Argon2id password hashing.
//!
//! Hashing is CPU bound, so all work runs on the blocking pool.

use crate::error::AuthError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

/// Argon2 cost parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argon2Config {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    /// OWASP baseline for Argon2id.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Password hashing service.
#[derive(Clone)]
pub struct PasswordService {
    hasher: Argon2<'static>,
    /// Hash of a random string, verified against when the account is
    /// unknown so both sign-in failures cost the same.
    dummy_hash: String,
}

impl PasswordService {
    pub fn new(config: &Argon2Config) -> Result<Self, AuthError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| AuthError::Crypto(format!("invalid argon2 parameters: {e}")))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let dummy_hash = hash_with(&hasher, uuid::Uuid::new_v4().to_string().as_bytes())?;

        Ok(Self { hasher, dummy_hash })
    }

    /// Hash a password into a PHC string.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_with(&hasher, password.as_bytes()))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
    }

    /// Check a password against a stored PHC string.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AuthError::Crypto(format!("stored hash unreadable: {e}")))?;
            Ok(hasher.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("verify task failed: {e}")))?
    }

    /// Burn the same work as a real verification. Always false.
    pub async fn verify_dummy(&self, password: &str) -> Result<bool, AuthError> {
        self.verify(password, &self.dummy_hash).await?;
        Ok(false)
    }
}

fn hash_with(hasher: &Argon2<'static>, password: &[u8]) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordService {
        PasswordService::new(&Argon2Config {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let service = cheap();
        let hash = service.hash("Password1").await.unwrap();

        assert_ne!(hash, "Password1");
        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify("Password1", &hash).await.unwrap());
        assert!(!service.verify("Password2", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let service = cheap();
        let a = service.hash("Password1").await.unwrap();
        let b = service.hash("Password1").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn dummy_verification_never_matches() {
        assert!(!cheap().verify_dummy("anything1").await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_is_an_error() {
        assert!(matches!(
            cheap().verify("Password1", "not-a-phc-string").await,
            Err(AuthError::Crypto(_))
        ));
    }

    #[test]
    fn rejects_invalid_params() {
        let result = PasswordService::new(&Argon2Config {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(result.is_err());
    }
}
