//! # Token Issuer
//!
//! Mints and verifies the two JWT families: short-lived stateless access
//! tokens and long-lived refresh tokens. The families are signed with
//! distinct secrets so one can never be presented as the other.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::user::User;

/// Marker carried by every refresh token
const REFRESH_TOKEN_TYPE: &str = "refresh";

// ==================
// Claims
// ==================

/// Claims embedded in an access token.
///
/// Verification is signature + expiry only; no server lookup happens on
/// the hot path, so these claims are the caller identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: Uuid,
    pub email: Option<String>,
    pub username: String,
    pub is_anonymous: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Claims embedded in a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User id
    pub sub: Uuid,
    /// Always `"refresh"`
    pub token_type: String,
    /// Unique per issuance so rotated tokens never collide
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

// ==================
// JWT Manager
// ==================

/// Signs and verifies access and refresh tokens
pub struct JwtManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    /// How long refresh tokens live; the ledger row mirrors this expiry
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token from a user record
    pub fn issue_access_token(&self, user: &User) -> AuthResult<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            is_anonymous: user.is_anonymous,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(|e| AuthError::Crypto(format!("access token signing failed: {}", e)))
    }

    /// Mint a refresh token, returning the token and its expiry.
    ///
    /// The caller must persist the token in the ledger before returning it;
    /// an unledgered refresh token is unusable by design.
    pub fn issue_refresh_token(&self, user: &User) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.refresh_ttl;
        let claims = RefreshClaims {
            sub: user.id,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(|e| AuthError::Crypto(format!("refresh token signing failed: {}", e)))?;
        Ok((token, expires_at))
    }

    /// Decode and verify an access token
    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        let validation = Validation::default();
        decode::<AccessClaims>(token, &self.access_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidOrExpiredToken)
    }

    /// Decode and verify a refresh token signature and expiry
    pub fn decode_refresh_token(&self, token: &str) -> AuthResult<RefreshClaims> {
        let validation = Validation::default();
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        Ok(claims)
    }
}
