//! # Identity Store
//!
//! Durable record of users and the sole owner of the uniqueness
//! constraints (email among non-null values, username always).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};

// ==================
// User Model
// ==================

/// A MoodHug user.
///
/// One row per durable identity regardless of provenance: password
/// accounts, anonymous guests, and social-only accounts all live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Unique among non-null values; None for guests
    pub email: Option<String>,
    /// Always unique
    pub username: String,
    /// None for anonymous and social-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: Option<String>,
    /// Avatar selector chosen at anonymous login
    pub avatar_id: Option<String>,
    pub is_verified: bool,
    pub is_anonymous: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a fresh user row with generated id and current timestamps.
    pub fn new(email: Option<String>, username: String, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            name: None,
            avatar_id: None,
            is_verified: false,
            is_anonymous: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==================
// User Repository Trait
// ==================

/// Repository for users.
///
/// `create` and `update` are the source of truth for uniqueness: a
/// conflicting email or username surfaces as `EmailInUse`/`UsernameInUse`
/// from the store itself, so two concurrent writers can never both win.
/// Workflow-level pre-checks are an optimization only.
pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Point lookup by either field, used by login
    fn find_by_email_or_username(&self, needle: &str) -> AuthResult<Option<User>> {
        if let Some(user) = self.find_by_email(needle)? {
            return Ok(Some(user));
        }
        self.find_by_username(needle)
    }

    /// Insert a new user; fails on email/username conflict
    fn create(&self, user: &User) -> AuthResult<()>;

    /// Replace an existing row; fails on conflict with a *different* user
    fn update(&self, user: &User) -> AuthResult<()>;
}

// ==================
// In-Memory User Repository
// ==================

/// In-memory user store used by tests and the development server
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Uniqueness check under the write lock, excluding `id` itself
    fn conflict(users: &HashMap<Uuid, User>, candidate: &User) -> Option<AuthError> {
        for other in users.values() {
            if other.id == candidate.id {
                continue;
            }
            if let (Some(a), Some(b)) = (candidate.email.as_deref(), other.email.as_deref()) {
                if a.eq_ignore_ascii_case(b) {
                    return Some(AuthError::EmailInUse);
                }
            }
            if other.username == candidate.username {
                return Some(AuthError::UsernameInUse);
            }
        }
        None
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.get(&id).cloned())
    }

    fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users
            .values()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().unwrap();
        if let Some(err) = Self::conflict(&users, user) {
            return Err(err);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn update(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().unwrap();
        if !users.contains_key(&user.id) {
            return Err(AuthError::UserNotFound);
        }
        if let Some(err) = Self::conflict(&users, user) {
            return Err(err);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }
}
