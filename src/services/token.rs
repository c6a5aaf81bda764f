// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! RS256 access token issuing and verification.
//!
//! Access tokens are stateless: they are signed with the private key and
//! verified with the public key, and are never stored server-side.

use crate::models::Role;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// `iss` claim of every access token.
pub const ISSUER: &str = "app";
/// Clock skew tolerated when checking `exp`.
pub const LEEWAY_SECS: u64 = 10;

const RSA_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Access token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

/// Why a token was rejected. Callers collapse all of these into one
/// "unauthorized" answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unexpected signing algorithm: {0}")]
    UnexpectedAlgorithm(String),
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("invalid key material: {0}")]
    Key(String),
}

/// Signs and verifies access tokens with an RSA key pair.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer from PEM-encoded keys (PKCS#1 or PKCS#8 private key,
    /// SPKI or PKCS#1 public key).
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        access_ttl: Duration,
    ) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| TokenError::Key(format!("private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| TokenError::Key(format!("public key: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = RSA_ALGORITHMS.to_vec();
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            access_ttl,
        })
    }

    /// Generate a throwaway RSA-2048 key pair. Tokens signed by it die with
    /// the process; meant for local development only.
    pub fn generate_ephemeral(access_ttl: Duration) -> Result<Self, TokenError> {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048)
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| TokenError::Key(e.to_string()))?;
        let public_pem = rsa::RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| TokenError::Key(e.to_string()))?;

        Self::from_pem(private_pem.as_bytes(), public_pem.as_bytes(), access_ttl)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue an access token valid for the configured TTL.
    pub fn issue_access(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, TokenError> {
        let now = now_unix_secs();
        let claims = AccessClaims {
            user_id,
            email: email.to_string(),
            role,
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + self.access_ttl.as_secs(),
        };
        self.sign(&claims)
    }

    /// Sign an explicit claim set with RS256.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm, issuer and expiry of an access token.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;

        // Never let the token header pick a non-RSA verifier.
        if !RSA_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg)));
        }

        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::UnexpectedAlgorithm(err.to_string())
        }
        ErrorKind::InvalidIssuer => TokenError::InvalidClaims("iss".to_string()),
        ErrorKind::MissingRequiredClaim(claim) => TokenError::InvalidClaims(claim.clone()),
        ErrorKind::ImmatureSignature => TokenError::InvalidClaims("nbf".to_string()),
        _ => TokenError::Malformed,
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/access_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/access_public.pem");
    const OTHER_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/other_private.pem");
    const OTHER_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/other_public.pem");

    fn issuer() -> TokenIssuer {
        TokenIssuer::from_pem(
            PRIVATE_PEM.as_bytes(),
            PUBLIC_PEM.as_bytes(),
            Duration::from_secs(900),
        )
        .unwrap()
    }

    fn claims_expiring_at(exp: u64) -> AccessClaims {
        AccessClaims {
            user_id: Uuid::new_v4(),
            email: "alice@x.com".to_string(),
            role: Role::User,
            iss: ISSUER.to_string(),
            iat: exp.saturating_sub(900),
            exp,
        }
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.issue_access(user_id, "alice@x.com", Role::Admin).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn header_declares_rs256() {
        let token = issuer()
            .issue_access(Uuid::new_v4(), "alice@x.com", Role::User)
            .unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(decode_header(&token).unwrap().alg, Algorithm::RS256);
    }

    #[test]
    fn rejects_token_from_other_key_pair() {
        let other = TokenIssuer::from_pem(
            OTHER_PRIVATE_PEM.as_bytes(),
            OTHER_PUBLIC_PEM.as_bytes(),
            Duration::from_secs(900),
        )
        .unwrap();
        let token = other
            .issue_access(Uuid::new_v4(), "mallory@x.com", Role::Admin)
            .unwrap();

        assert_eq!(issuer().verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn accepts_expiry_within_leeway() {
        let issuer = issuer();
        let token = issuer.sign(&claims_expiring_at(now_unix_secs() - 5)).unwrap();
        assert!(issuer.verify(&token).is_ok());
    }

    #[test]
    fn rejects_expiry_beyond_leeway() {
        let issuer = issuer();
        let token = issuer.sign(&claims_expiring_at(now_unix_secs() - 30)).unwrap();
        assert_eq!(issuer.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn rejects_hmac_algorithm_confusion() {
        // Classic confusion attack: HS256 keyed with the public key bytes.
        let claims = claims_expiring_at(now_unix_secs() + 600);
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            issuer().verify(&forged),
            Err(TokenError::UnexpectedAlgorithm(_))
        ));
    }

    #[test]
    fn rejects_malformed_token() {
        assert_eq!(issuer().verify("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(issuer().verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let issuer = issuer();
        let mut claims = claims_expiring_at(now_unix_secs() + 600);
        claims.iss = "someone-else".to_string();
        let token = issuer.sign(&claims).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(TokenError::InvalidClaims(_))
        ));
    }
}
