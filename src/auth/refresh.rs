//! # Refresh Token Ledger
//!
//! Durable record of issued refresh tokens. A ledger row exists from
//! issuance until first use (rotation) or revocation; several live rows
//! per user are normal (multi-device).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::AuthResult;

// ==================
// Refresh Token Model
// ==================

/// A ledgered refresh token
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Opaque secret as handed to the client
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(user_id: Uuid, token: String, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

// ==================
// Ledger Trait
// ==================

/// Repository for the refresh token ledger
pub trait RefreshTokenRepository: Send + Sync {
    /// Look up a ledger row by the token string itself
    fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>>;

    /// Persist a freshly issued token
    fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Remove the row for a token and return it, in one step under the
    /// store's lock. Of any number of concurrent presenters of the same
    /// token, exactly one receives the row; the rest see `None`.
    fn consume_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>>;

    /// Delete every row for a user; returns how many were removed
    fn delete_all_for_user(&self, user_id: Uuid) -> AuthResult<usize>;

    /// Drop rows past their expiry; returns how many were removed
    fn delete_expired(&self) -> AuthResult<usize>;
}

// ==================
// In-Memory Ledger
// ==================

/// In-memory ledger used by tests and the development server
pub struct InMemoryRefreshTokenRepository {
    tokens: RwLock<HashMap<Uuid, RefreshToken>>,
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRefreshTokenRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    fn find_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
        let tokens = self.tokens.read().unwrap();
        Ok(tokens.values().find(|t| t.token == token).cloned())
    }

    fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        let mut tokens = self.tokens.write().unwrap();
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    fn consume_by_token(&self, token: &str) -> AuthResult<Option<RefreshToken>> {
        let mut tokens = self.tokens.write().unwrap();
        let id = tokens.values().find(|t| t.token == token).map(|t| t.id);
        Ok(id.and_then(|id| tokens.remove(&id)))
    }

    fn delete_all_for_user(&self, user_id: Uuid) -> AuthResult<usize> {
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
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
