//! # Verification Token Manager
//!
//! Single-purpose, time-boxed tokens proving control of an email address
//! (email verification) or authorization to reset a password. Only the
//! SHA-256 digest is stored; the raw token exists once, in the issuance
//! email.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::crypto::{generate_token, token_digest};
use super::errors::AuthResult;

// ==================
// Token Kind
// ==================

/// Purpose of a verification token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    EmailVerification,
    PasswordReset,
}

// ==================
// Verification Token Model
// ==================

/// A stored verification token (digest at rest)
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub kind: VerificationKind,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Issue a fresh token; returns the raw value alongside the row.
    pub fn issue(user_id: Uuid, kind: VerificationKind, ttl: Duration) -> (String, Self) {
        let raw = generate_token();
        let row = Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_digest(&raw),
            kind,
            expires_at: Utc::now() + ttl,
            created_at: Utc::now(),
        };
        (raw, row)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

// ==================
// Repository Trait
// ==================

/// Repository for verification tokens
pub trait VerificationTokenRepository: Send + Sync {
    /// Look up a row by raw-token digest and purpose
    fn find_by_digest(&self, digest: &str, kind: VerificationKind)
        -> AuthResult<Option<VerificationToken>>;

    fn create(&self, token: &VerificationToken) -> AuthResult<()>;

    /// Remove the row for a digest and purpose and return it, in one
    /// step under the store's lock. Of any number of concurrent
    /// presenters, exactly one receives the row; the rest see `None`.
    fn consume_by_digest(
        &self,
        digest: &str,
        kind: VerificationKind,
    ) -> AuthResult<Option<VerificationToken>>;

    /// Delete every row of one purpose for a user; returns how many
    fn delete_all_for_user(&self, user_id: Uuid, kind: VerificationKind) -> AuthResult<usize>;

    /// Drop rows past their expiry; returns how many were removed
    fn delete_expired(&self) -> AuthResult<usize>;
}

// ==================
// In-Memory Repository
// ==================

/// In-memory verification token store
pub struct InMemoryVerificationTokenRepository {
    tokens: RwLock<HashMap<Uuid, VerificationToken>>,
}

impl InMemoryVerificationTokenRepository {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVerificationTokenRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationTokenRepository for InMemoryVerificationTokenRepository {
    fn find_by_digest(
        &self,
        digest: &str,
        kind: VerificationKind,
    ) -> AuthResult<Option<VerificationToken>> {
        let tokens = self.tokens.read().unwrap();
        Ok(tokens
            .values()
            .find(|t| t.token_hash == digest && t.kind == kind)
            .cloned())
    }

    fn create(&self, token: &VerificationToken) -> AuthResult<()> {
        let mut tokens = self.tokens.write().unwrap();
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    fn consume_by_digest(
        &self,
        digest: &str,
        kind: VerificationKind,
    ) -> AuthResult<Option<VerificationToken>> {
        let mut tokens = self.tokens.write().unwrap();
        let id = tokens
            .values()
            .find(|t| t.token_hash == digest && t.kind == kind)
            .map(|t| t.id);
        Ok(id.and_then(|id| tokens.remove(&id)))
    }

    fn delete_all_for_user(&self, user_id: Uuid, kind: VerificationKind) -> AuthResult<usize> {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| !(t.user_id == user_id && t.kind == kind));
        Ok(before - tokens.len())
    }

    fn delete_expired(&self) -> AuthResult<usize> {
        let mut tokens = self.tokens.write().unwrap();
        let now = Utc::now();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok(before - tokens.len())
    }
}
