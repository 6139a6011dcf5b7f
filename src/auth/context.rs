//! # Auth Context Resolver
//!
//! Runs once per inbound request: turns an optional `Authorization`
//! header into an optional caller identity. Absent, malformed, expired,
//! or badly signed tokens all resolve to an anonymous context rather
//! than an error; workflows that need a caller reject explicitly.

use super::errors::{AuthError, AuthResult};
use super::jwt::{AccessClaims, JwtManager};

/// Request-scoped caller identity
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub caller: Option<AccessClaims>,
}

impl AuthContext {
    /// Anonymous context (no or unusable bearer token)
    pub fn anonymous() -> Self {
        Self { caller: None }
    }

    /// Resolve a raw `Authorization` header value.
    ///
    /// Fail-open to anonymous; fail-closed per workflow via [`require`].
    ///
    /// [`require`]: AuthContext::require
    pub fn resolve(jwt: &JwtManager, authorization: Option<&str>) -> Self {
        let caller = authorization
            .and_then(bearer_token)
            .and_then(|token| jwt.decode_access_token(token).ok());
        Self { caller }
    }

    /// Reject anonymous contexts for protected workflows
    pub fn require(&self) -> AuthResult<&AccessClaims> {
        self.caller.as_ref().ok_or(AuthError::AuthRequired)
    }
}

/// Extract the token from a `Bearer <token>` header value
fn bearer_token(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
