//! # Auth Workflows
//!
//! Orchestrates the identity leaves into the service-boundary workflows:
//! register, login, refresh, logout, password reset, email verification,
//! anonymous sessions, anonymous conversion, and social login. Each
//! workflow is a short sequence of repository calls; the repositories own
//! uniqueness, so the pre-checks here are only a fast path for friendlier
//! errors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

use super::context::AuthContext;
use super::crypto::{hash_password, token_digest, verify_password};
use super::email::{EmailSender, EmailTemplate};
use super::errors::{AuthError, AuthResult};
use super::jwt::JwtManager;
use super::refresh::{RefreshToken, RefreshTokenRepository};
use super::social::{
    ProviderGateway, SocialAuth, SocialAuthRepository, SocialProfile, SocialProvider,
    SocialProviderConfig,
};
use super::user::{User, UserRepository};
use super::verification::{VerificationKind, VerificationToken, VerificationTokenRepository};

/// Attempts at generating a non-colliding random username
const USERNAME_ATTEMPTS: usize = 10;

// ==================
// Inputs & Payloads
// ==================

/// Register workflow input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// Login workflow input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    pub email_or_username: String,
    pub password: String,
}

/// Convert-anonymous workflow input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertAnonymousInput {
    pub email: Option<String>,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// Atomic token payload: tokens and user always travel together
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Result of introspecting an access token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenVerification {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    pub error: Option<String>,
}

// ==================
// Auth Service
// ==================

/// The identity and token lifecycle service.
///
/// Stateless per request; every collaborator is injected at construction
/// and shared state lives behind the repository traits.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    verification_tokens: Arc<dyn VerificationTokenRepository>,
    social_auths: Arc<dyn SocialAuthRepository>,
    gateway: Arc<dyn ProviderGateway>,
    email: Arc<dyn EmailSender>,
    jwt: JwtManager,
    providers: HashMap<SocialProvider, SocialProviderConfig>,
    email_verification_ttl: chrono::Duration,
    password_reset_ttl: chrono::Duration,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        verification_tokens: Arc<dyn VerificationTokenRepository>,
        social_auths: Arc<dyn SocialAuthRepository>,
        gateway: Arc<dyn ProviderGateway>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            verification_tokens,
            social_auths,
            gateway,
            email,
            jwt: JwtManager::new(
                &config.access_token_secret,
                &config.refresh_token_secret,
                config.access_token_ttl,
                config.refresh_token_ttl,
            ),
            providers: config
                .providers
                .iter()
                .map(|p| (p.provider, p.clone()))
                .collect(),
            email_verification_ttl: config.email_verification_ttl,
            password_reset_ttl: config.password_reset_ttl,
        }
    }

    /// Token issuer used by the context resolver
    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    // ==================
    // Register & Login
    // ==================

    pub fn register(&self, input: RegisterInput) -> AuthResult<AuthPayload> {
        validate_email(&input.email)?;
        validate_username(&input.username)?;
        validate_password(&input.password)?;

        // Fast-path pre-checks; the store re-checks under its own lock
        if self.users.find_by_email(&input.email)?.is_some() {
            return Err(AuthError::EmailInUse);
        }
        if self.users.find_by_username(&input.username)?.is_some() {
            return Err(AuthError::UsernameInUse);
        }

        let mut user = User::new(
            Some(input.email.clone()),
            input.username,
            Some(hash_password(&input.password)?),
        );
        user.name = input.name;
        self.users.create(&user)?;

        let (raw, token) = VerificationToken::issue(
            user.id,
            VerificationKind::EmailVerification,
            self.email_verification_ttl,
        );
        self.verification_tokens.create(&token)?;
        self.email.send(EmailTemplate::VerifyEmail {
            to: input.email,
            token: raw,
            expires_hours: self.email_verification_ttl.num_hours(),
        })?;

        tracing::info!(user_id = %user.id, "user registered");
        self.issue_tokens(user)
    }

    pub fn login(&self, input: LoginInput) -> AuthResult<AuthPayload> {
        // One generic error for unknown user and wrong password
        let mut user = self
            .users
            .find_by_email_or_username(&input.email_or_username)?
            .ok_or(AuthError::InvalidCredentials)?;
        let stored = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&input.password, stored)? {
            tracing::debug!(user_id = %user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        user.last_login_at = Some(Utc::now());
        user.updated_at = Utc::now();
        self.users.update(&user)?;

        tracing::info!(user_id = %user.id, "user logged in");
        self.issue_tokens(user)
    }

    // ==================
    // Refresh & Logout
    // ==================

    /// Rotate a refresh token: the presented token is consumed and a
    /// brand-new pair is issued, so a leaked token is good for one use.
    pub fn refresh(&self, refresh_token: &str) -> AuthResult<AuthPayload> {
        self.jwt.decode_refresh_token(refresh_token)?;

        // Consume first; of concurrent presenters exactly one gets the row
        let ledgered = self
            .refresh_tokens
            .consume_by_token(refresh_token)?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if ledgered.is_expired() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .users
            .find_by_id(ledgered.user_id)?
            .ok_or(AuthError::UserNotFound)?;
        self.issue_tokens(user)
    }

    /// Logging out with no session is a no-op success.
    pub fn logout(&self, ctx: &AuthContext) -> AuthResult<()> {
        let Some(claims) = &ctx.caller else {
            return Ok(());
        };
        let revoked = self.refresh_tokens.delete_all_for_user(claims.sub)?;
        tracing::info!(user_id = %claims.sub, revoked, "logout revoked all sessions");
        Ok(())
    }

    // ==================
    // Password Reset & Change
    // ==================

    /// Always succeeds, whether or not the email exists.
    pub fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let Some(user) = self.users.find_by_email(email)? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        // A new request invalidates prior reset tokens
        self.verification_tokens
            .delete_all_for_user(user.id, VerificationKind::PasswordReset)?;

        let (raw, token) =
            VerificationToken::issue(user.id, VerificationKind::PasswordReset, self.password_reset_ttl);
        self.verification_tokens.create(&token)?;
        self.email.send(EmailTemplate::ResetPassword {
            to: email.to_string(),
            token: raw,
            expires_hours: self.password_reset_ttl.num_hours(),
        })?;
        Ok(())
    }

    pub fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;

        // Consume first; a replay of the same token finds nothing
        let row = self
            .verification_tokens
            .consume_by_digest(&token_digest(token), VerificationKind::PasswordReset)?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if row.is_expired() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let mut user = self
            .users
            .find_by_id(row.user_id)?
            .ok_or(AuthError::UserNotFound)?;
        user.password_hash = Some(hash_password(new_password)?);
        user.updated_at = Utc::now();
        self.users.update(&user)?;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    pub fn change_password(
        &self,
        ctx: &AuthContext,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let claims = ctx.require()?;
        validate_password(new_password)?;

        let mut user = self
            .users
            .find_by_id(claims.sub)?
            .ok_or(AuthError::UserNotFound)?;
        let stored = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCurrentPassword)?;
        if !verify_password(current_password, stored)? {
            return Err(AuthError::InvalidCurrentPassword);
        }

        user.password_hash = Some(hash_password(new_password)?);
        user.updated_at = Utc::now();
        self.users.update(&user)?;
        Ok(())
    }

    // ==================
    // Email Verification
    // ==================

    pub fn verify_email(&self, token: &str) -> AuthResult<User> {
        let row = self
            .verification_tokens
            .consume_by_digest(&token_digest(token), VerificationKind::EmailVerification)?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if row.is_expired() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let mut user = self
            .users
            .find_by_id(row.user_id)?
            .ok_or(AuthError::UserNotFound)?;
        user.is_verified = true;
        user.updated_at = Utc::now();
        self.users.update(&user)?;
        Ok(user)
    }

    // ==================
    // Anonymous Sessions
    // ==================

    /// Create a working guest session with no credential at all.
    pub fn anonymous_login(
        &self,
        nickname: Option<String>,
        avatar_id: Option<String>,
    ) -> AuthResult<AuthPayload> {
        let mut last_err = AuthError::UsernameInUse;
        for _ in 0..USERNAME_ATTEMPTS {
            let mut user = User::new(None, guest_username(), None);
            user.name = nickname.clone();
            user.avatar_id = avatar_id.clone();
            user.is_anonymous = true;
            // No claim of identity is made, so nothing is unverified
            user.is_verified = true;

            match self.users.create(&user) {
                Ok(()) => {
                    tracing::info!(user_id = %user.id, "anonymous session created");
                    return self.issue_tokens(user);
                }
                Err(AuthError::UsernameInUse) => last_err = AuthError::UsernameInUse,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Upgrade an anonymous account in place; the user id never changes.
    pub fn convert_anonymous(
        &self,
        ctx: &AuthContext,
        input: ConvertAnonymousInput,
    ) -> AuthResult<AuthPayload> {
        let claims = ctx.require()?;
        if let Some(email) = &input.email {
            validate_email(email)?;
        }
        validate_username(&input.username)?;
        validate_password(&input.password)?;

        let mut user = self
            .users
            .find_by_id(claims.sub)?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_anonymous {
            return Err(AuthError::NotAnonymous);
        }

        // Taken only counts when it belongs to somebody else
        if let Some(email) = &input.email {
            if let Some(other) = self.users.find_by_email(email)? {
                if other.id != user.id {
                    return Err(AuthError::EmailInUse);
                }
            }
        }
        if let Some(other) = self.users.find_by_username(&input.username)? {
            if other.id != user.id {
                return Err(AuthError::UsernameInUse);
            }
        }

        user.email = input.email;
        user.username = input.username;
        user.password_hash = Some(hash_password(&input.password)?);
        if input.name.is_some() {
            user.name = input.name;
        }
        user.is_anonymous = false;
        user.updated_at = Utc::now();
        self.users.update(&user)?;

        // The account gained a password; every old session is suspect
        self.refresh_tokens.delete_all_for_user(user.id)?;
        tracing::info!(user_id = %user.id, "anonymous account converted");
        self.issue_tokens(user)
    }

    // ==================
    // Social Login
    // ==================

    pub fn social_login(
        &self,
        provider: SocialProvider,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<AuthPayload> {
        let profile = self.gateway.exchange_code(provider, code, redirect_uri)?;
        if profile.provider_id.is_empty() {
            return Err(AuthError::Provider("profile has no subject id".to_string()));
        }

        let mut user = self.resolve_social_user(provider, &profile)?;
        user.last_login_at = Some(Utc::now());
        user.updated_at = Utc::now();
        self.users.update(&user)?;

        self.issue_tokens(user)
    }

    /// Strict resolution order: existing link, then email match, then a
    /// brand-new account.
    fn resolve_social_user(
        &self,
        provider: SocialProvider,
        profile: &SocialProfile,
    ) -> AuthResult<User> {
        if let Some(link) = self
            .social_auths
            .find_by_provider_id(provider, &profile.provider_id)?
        {
            return self
                .users
                .find_by_id(link.user_id)?
                .ok_or(AuthError::UserNotFound);
        }

        if let Some(email) = &profile.email {
            if let Some(existing) = self.users.find_by_email(email)? {
                // The provider verified the email; link without a password
                return match self
                    .social_auths
                    .create(&SocialAuth::new(existing.id, provider, profile))
                {
                    Ok(()) => {
                        tracing::info!(user_id = %existing.id, %provider, "linked social identity to existing account");
                        Ok(existing)
                    }
                    // A concurrent login linked first; their link stands
                    Err(AuthError::SocialIdentityInUse) => self.linked_user(provider, profile),
                    Err(e) => Err(e),
                };
            }
        }

        let user = self.create_social_user(profile)?;
        match self
            .social_auths
            .create(&SocialAuth::new(user.id, provider, profile))
        {
            Ok(()) => {
                tracing::info!(user_id = %user.id, %provider, "created account from social identity");
                Ok(user)
            }
            Err(AuthError::SocialIdentityInUse) => self.linked_user(provider, profile),
            Err(e) => Err(e),
        }
    }

    /// Account already linked to this identity; losing a link race lands
    /// here and resolves to the winner's user.
    fn linked_user(&self, provider: SocialProvider, profile: &SocialProfile) -> AuthResult<User> {
        let link = self
            .social_auths
            .find_by_provider_id(provider, &profile.provider_id)?
            .ok_or(AuthError::UserNotFound)?;
        self.users
            .find_by_id(link.user_id)?
            .ok_or(AuthError::UserNotFound)
    }

    fn create_social_user(&self, profile: &SocialProfile) -> AuthResult<User> {
        let base = username_base(profile.name.as_deref());
        let mut last_err = AuthError::UsernameInUse;
        for _ in 0..USERNAME_ATTEMPTS {
            let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
            let mut user = User::new(
                profile.email.clone(),
                format!("{}{:04}", base, suffix),
                None,
            );
            user.name = profile.name.clone();
            // Trust the provider's verification
            user.is_verified = true;

            match self.users.create(&user) {
                Ok(()) => return Ok(user),
                Err(AuthError::UsernameInUse) => last_err = AuthError::UsernameInUse,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Build the provider's authorization URL from static configuration.
    pub fn social_auth_url(
        &self,
        provider: SocialProvider,
        redirect_uri: Option<&str>,
    ) -> AuthResult<String> {
        let config = self
            .providers
            .get(&provider)
            .ok_or_else(|| AuthError::ProviderNotConfigured(provider.to_string()))?;
        Ok(config.build_auth_url(redirect_uri))
    }

    // ==================
    // Queries
    // ==================

    pub fn me(&self, ctx: &AuthContext) -> AuthResult<User> {
        let claims = ctx.require()?;
        self.users
            .find_by_id(claims.sub)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn user_by_id(&self, id: Uuid) -> AuthResult<User> {
        self.users.find_by_id(id)?.ok_or(AuthError::UserNotFound)
    }

    pub fn user_by_email(&self, email: &str) -> AuthResult<User> {
        self.users
            .find_by_email(email)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn user_by_username(&self, username: &str) -> AuthResult<User> {
        self.users
            .find_by_username(username)?
            .ok_or(AuthError::UserNotFound)
    }

    /// Structured introspection; a bad token is an answer, not an error.
    pub fn verify_token(&self, token: &str) -> TokenVerification {
        match self.jwt.decode_access_token(token) {
            Ok(claims) => TokenVerification {
                valid: true,
                user_id: Some(claims.sub),
                error: None,
            },
            Err(e) => TokenVerification {
                valid: false,
                user_id: None,
                error: Some(e.to_string()),
            },
        }
    }

    // ==================
    // Maintenance
    // ==================

    /// Drop expired rows from both token stores. Expired tokens already
    /// fail on presentation; this reclaims rows nobody will present.
    pub fn purge_expired_tokens(&self) -> AuthResult<()> {
        let refresh = self.refresh_tokens.delete_expired()?;
        let verification = self.verification_tokens.delete_expired()?;
        if refresh + verification > 0 {
            tracing::info!(refresh, verification, "purged expired tokens");
        }
        Ok(())
    }

    // ==================
    // Token Issuance
    // ==================

    /// Mint an access/refresh pair; the refresh token is ledgered before
    /// the payload is returned.
    fn issue_tokens(&self, user: User) -> AuthResult<AuthPayload> {
        let access_token = self.jwt.issue_access_token(&user)?;
        let (refresh_token, expires_at) = self.jwt.issue_refresh_token(&user)?;
        self.refresh_tokens
            .create(&RefreshToken::new(user.id, refresh_token.clone(), expires_at))?;
        Ok(AuthPayload {
            access_token,
            refresh_token,
            user,
        })
    }
}

// ==================
// Input Validation
// ==================

/// Random `guest######` username
fn guest_username() -> String {
    format!("guest{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Lowercased alphanumeric base for derived usernames
fn username_base(name: Option<&str>) -> String {
    let base: String = name
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(20)
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    let parts: Vec<&str> = email.split('@').collect();
    let ok = parts.len() == 2
        && !parts[0].is_empty()
        && !parts[1].is_empty()
        && parts[1].contains('.')
        && !parts[1].starts_with('.')
        && !parts[1].ends_with('.');
    if ok {
        Ok(())
    } else {
        Err(AuthError::Validation("invalid email format".to_string()))
    }
}

fn validate_username(username: &str) -> AuthResult<()> {
    if username.len() < 3 || username.len() > 30 {
        return Err(AuthError::Validation(
            "username must be 3-30 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::Validation(
            "username may contain letters, digits, and underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::email::testing::CapturingEmailSender;
    use crate::auth::refresh::InMemoryRefreshTokenRepository;
    use crate::auth::social::{InMemorySocialAuthRepository, StubProviderGateway};
    use crate::auth::user::InMemoryUserRepository;
    use crate::auth::verification::InMemoryVerificationTokenRepository;

    struct Harness {
        service: AuthService,
        email: Arc<CapturingEmailSender>,
    }

    fn harness() -> Harness {
        let mut config = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
            .expect("test config is valid");
        config.providers.push(SocialProviderConfig::new(
            SocialProvider::Google,
            "google-client-id".to_string(),
            "https://app.moodhug.example/callback".to_string(),
        ));

        let email = Arc::new(CapturingEmailSender::new());
        let service = AuthService::new(
            &config,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryRefreshTokenRepository::new()),
            Arc::new(InMemoryVerificationTokenRepository::new()),
            Arc::new(InMemorySocialAuthRepository::new()),
            Arc::new(StubProviderGateway),
            email.clone(),
        );
        Harness { service, email }
    }

    fn register_input() -> RegisterInput {
        RegisterInput {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "Secret123".to_string(),
            name: None,
        }
    }

    fn ctx_for(service: &AuthService, payload: &AuthPayload) -> AuthContext {
        AuthContext::resolve(
            service.jwt(),
            Some(&format!("Bearer {}", payload.access_token)),
        )
    }

    // ==================
    // Register & Login
    // ==================

    #[test]
    fn test_register_success() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();

        assert!(!payload.user.is_verified);
        assert!(!payload.user.is_anonymous);
        assert_eq!(payload.user.username, "alice");
        assert!(h.email.last_token().is_some());

        // Claims match the user at issuance
        let claims = h
            .service
            .jwt()
            .decode_access_token(&payload.access_token)
            .unwrap();
        assert_eq!(claims.sub, payload.user.id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_register_duplicate_email() {
        let h = harness();
        h.service.register(register_input()).unwrap();

        let mut dup = register_input();
        dup.username = "bob".to_string();
        assert!(matches!(h.service.register(dup), Err(AuthError::EmailInUse)));
    }

    #[test]
    fn test_register_duplicate_username() {
        let h = harness();
        h.service.register(register_input()).unwrap();

        let mut dup = register_input();
        dup.email = "b@x.com".to_string();
        assert!(matches!(
            h.service.register(dup),
            Err(AuthError::UsernameInUse)
        ));
    }

    #[test]
    fn test_register_rejects_malformed_input() {
        let h = harness();

        let mut bad = register_input();
        bad.email = "not-an-email".to_string();
        assert!(matches!(h.service.register(bad), Err(AuthError::Validation(_))));

        let mut bad = register_input();
        bad.password = "short".to_string();
        assert!(matches!(h.service.register(bad), Err(AuthError::Validation(_))));
    }

    #[test]
    fn test_login_by_email_and_by_username() {
        let h = harness();
        h.service.register(register_input()).unwrap();

        for needle in ["a@x.com", "alice"] {
            let payload = h
                .service
                .login(LoginInput {
                    email_or_username: needle.to_string(),
                    password: "Secret123".to_string(),
                })
                .unwrap();
            assert!(payload.user.last_login_at.is_some());
        }
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let h = harness();
        h.service.register(register_input()).unwrap();

        let wrong_password = h.service.login(LoginInput {
            email_or_username: "alice".to_string(),
            password: "wrong-password".to_string(),
        });
        let unknown_user = h.service.login(LoginInput {
            email_or_username: "nobody".to_string(),
            password: "Secret123".to_string(),
        });

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown_user, Err(AuthError::InvalidCredentials)));
    }

    // ==================
    // Refresh & Logout
    // ==================

    #[test]
    fn test_refresh_rotation_blocks_replay() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();

        let rotated = h.service.refresh(&payload.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, payload.refresh_token);
        assert_eq!(rotated.user.id, payload.user.id);

        // The consumed token can never replay
        assert!(matches!(
            h.service.refresh(&payload.refresh_token),
            Err(AuthError::InvalidOrExpiredToken)
        ));
        // The rotated one still works
        h.service.refresh(&rotated.refresh_token).unwrap();
    }

    #[test]
    fn test_refresh_rejects_unledgered_token() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();

        // Signed correctly but never ledgered
        let (foreign, _) = h.service.jwt().issue_refresh_token(&payload.user).unwrap();
        assert!(matches!(
            h.service.refresh(&foreign),
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn test_refresh_concurrent_presenters_single_winner() {
        use std::sync::Barrier;

        let h = harness();
        let payload = h.service.register(register_input()).unwrap();
        let token = payload.refresh_token;
        let service = Arc::new(h.service);

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = token.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    service.refresh(&token).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_purge_expired_tokens_keeps_live_sessions() {
        let config = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
            .expect("test config is valid");
        let refresh_repo = Arc::new(InMemoryRefreshTokenRepository::new());
        let service = AuthService::new(
            &config,
            Arc::new(InMemoryUserRepository::new()),
            refresh_repo.clone(),
            Arc::new(InMemoryVerificationTokenRepository::new()),
            Arc::new(InMemorySocialAuthRepository::new()),
            Arc::new(StubProviderGateway),
            Arc::new(CapturingEmailSender::new()),
        );

        let payload = service.register(register_input()).unwrap();
        let stale = RefreshToken::new(
            payload.user.id,
            "stale".to_string(),
            Utc::now() - chrono::Duration::hours(1),
        );
        refresh_repo.create(&stale).unwrap();

        service.purge_expired_tokens().unwrap();
        assert!(refresh_repo.find_by_token("stale").unwrap().is_none());
        // The live session survives the sweep
        service.refresh(&payload.refresh_token).unwrap();
    }

    #[test]
    fn test_logout_revokes_every_session_but_not_access_tokens() {
        let h = harness();
        let first = h.service.register(register_input()).unwrap();
        let second = h
            .service
            .login(LoginInput {
                email_or_username: "alice".to_string(),
                password: "Secret123".to_string(),
            })
            .unwrap();

        h.service.logout(&ctx_for(&h.service, &first)).unwrap();

        assert!(h.service.refresh(&first.refresh_token).is_err());
        assert!(h.service.refresh(&second.refresh_token).is_err());
        // Asymmetric revocation: the access token rides out its TTL
        assert!(h.service.verify_token(&first.access_token).valid);
    }

    #[test]
    fn test_logout_without_session_is_noop_success() {
        let h = harness();
        h.service.logout(&AuthContext::anonymous()).unwrap();
    }

    // ==================
    // Password Reset & Change
    // ==================

    #[test]
    fn test_reset_request_never_leaks_account_existence() {
        let h = harness();
        h.service.request_password_reset("ghost@x.com").unwrap();
        assert!(h.email.last_token().is_none());
    }

    #[test]
    fn test_reset_token_is_single_use() {
        let h = harness();
        h.service.register(register_input()).unwrap();
        h.service.request_password_reset("a@x.com").unwrap();
        let token = h.email.last_token().unwrap();

        h.service.reset_password(&token, "NewSecret456").unwrap();
        assert!(matches!(
            h.service.reset_password(&token, "NewSecret789"),
            Err(AuthError::InvalidOrExpiredToken)
        ));

        // Old password gone, new one works
        assert!(h
            .service
            .login(LoginInput {
                email_or_username: "alice".to_string(),
                password: "Secret123".to_string(),
            })
            .is_err());
        h.service
            .login(LoginInput {
                email_or_username: "alice".to_string(),
                password: "NewSecret456".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_new_reset_request_invalidates_prior_token() {
        let h = harness();
        h.service.register(register_input()).unwrap();

        h.service.request_password_reset("a@x.com").unwrap();
        let old_token = h.email.last_token().unwrap();
        h.service.request_password_reset("a@x.com").unwrap();
        let new_token = h.email.last_token().unwrap();

        assert!(matches!(
            h.service.reset_password(&old_token, "NewSecret456"),
            Err(AuthError::InvalidOrExpiredToken)
        ));
        h.service.reset_password(&new_token, "NewSecret456").unwrap();
    }

    #[test]
    fn test_change_password_requires_correct_current() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();
        let ctx = ctx_for(&h.service, &payload);

        assert!(matches!(
            h.service.change_password(&ctx, "wrong", "NewSecret456"),
            Err(AuthError::InvalidCurrentPassword)
        ));
        h.service
            .change_password(&ctx, "Secret123", "NewSecret456")
            .unwrap();
        h.service
            .login(LoginInput {
                email_or_username: "alice".to_string(),
                password: "NewSecret456".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_change_password_requires_authentication() {
        let h = harness();
        assert!(matches!(
            h.service
                .change_password(&AuthContext::anonymous(), "a-password", "NewSecret456"),
            Err(AuthError::AuthRequired)
        ));
    }

    // ==================
    // Email Verification
    // ==================

    #[test]
    fn test_verify_email_consumes_token() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();
        let token = h.email.last_token().unwrap();

        let user = h.service.verify_email(&token).unwrap();
        assert_eq!(user.id, payload.user.id);
        assert!(user.is_verified);

        assert!(matches!(
            h.service.verify_email(&token),
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    // ==================
    // Anonymous Sessions
    // ==================

    #[test]
    fn test_anonymous_login_creates_guest() {
        let h = harness();
        let payload = h
            .service
            .anonymous_login(Some("Gus".to_string()), Some("bear".to_string()))
            .unwrap();

        let user = &payload.user;
        assert!(user.is_anonymous);
        assert!(user.is_verified);
        assert!(user.email.is_none());
        assert_eq!(user.name.as_deref(), Some("Gus"));
        assert_eq!(user.avatar_id.as_deref(), Some("bear"));

        // guest followed by six digits
        assert!(user.username.starts_with("guest"));
        let digits = &user.username["guest".len()..];
        assert_eq!(digits.len(), 6);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));

        // The session works immediately
        assert!(h.service.verify_token(&payload.access_token).valid);
        h.service.refresh(&payload.refresh_token).unwrap();
    }

    #[test]
    fn test_convert_preserves_identity_and_revokes_sessions() {
        let h = harness();
        let guest = h.service.anonymous_login(None, None).unwrap();
        let ctx = ctx_for(&h.service, &guest);

        let converted = h
            .service
            .convert_anonymous(
                &ctx,
                ConvertAnonymousInput {
                    email: Some("gus@x.com".to_string()),
                    username: "gus".to_string(),
                    password: "Secret123".to_string(),
                    name: Some("Gus".to_string()),
                },
            )
            .unwrap();

        assert_eq!(converted.user.id, guest.user.id);
        assert!(!converted.user.is_anonymous);
        assert_eq!(converted.user.email.as_deref(), Some("gus@x.com"));

        // Pre-conversion refresh token was revoked; the fresh one works
        assert!(h.service.refresh(&guest.refresh_token).is_err());
        h.service.refresh(&converted.refresh_token).unwrap();

        // The account now logs in with its password
        h.service
            .login(LoginInput {
                email_or_username: "gus".to_string(),
                password: "Secret123".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_convert_rejects_non_anonymous_caller() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();
        let ctx = ctx_for(&h.service, &payload);

        let result = h.service.convert_anonymous(
            &ctx,
            ConvertAnonymousInput {
                email: None,
                username: "alice2".to_string(),
                password: "Secret123".to_string(),
                name: None,
            },
        );
        assert!(matches!(result, Err(AuthError::NotAnonymous)));

        // No mutation happened
        let user = h.service.user_by_id(payload.user.id).unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_convert_rejects_taken_identifiers() {
        let h = harness();
        h.service.register(register_input()).unwrap();
        let guest = h.service.anonymous_login(None, None).unwrap();
        let ctx = ctx_for(&h.service, &guest);

        let taken_email = h.service.convert_anonymous(
            &ctx,
            ConvertAnonymousInput {
                email: Some("a@x.com".to_string()),
                username: "gus".to_string(),
                password: "Secret123".to_string(),
                name: None,
            },
        );
        assert!(matches!(taken_email, Err(AuthError::EmailInUse)));

        let taken_username = h.service.convert_anonymous(
            &ctx,
            ConvertAnonymousInput {
                email: Some("gus@x.com".to_string()),
                username: "alice".to_string(),
                password: "Secret123".to_string(),
                name: None,
            },
        );
        assert!(matches!(taken_username, Err(AuthError::UsernameInUse)));
    }

    // ==================
    // Social Login
    // ==================

    #[test]
    fn test_social_login_is_idempotent() {
        let h = harness();
        let first = h
            .service
            .social_login(SocialProvider::Google, "code-1", None)
            .unwrap();
        let second = h
            .service
            .social_login(SocialProvider::Google, "code-1", None)
            .unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert!(first.user.is_verified);
        assert!(!first.user.is_anonymous);
        assert!(first.user.password_hash.is_none());
    }

    #[test]
    fn test_social_login_links_existing_account_by_email() {
        let h = harness();
        let registered = h
            .service
            .register(RegisterInput {
                // StubProviderGateway derives this address from the code
                email: "code-1@google.example".to_string(),
                username: "alice".to_string(),
                password: "Secret123".to_string(),
                name: None,
            })
            .unwrap();

        let social = h
            .service
            .social_login(SocialProvider::Google, "code-1", None)
            .unwrap();
        assert_eq!(social.user.id, registered.user.id);
    }

    /// SocialAuth store whose `create` always loses to a rival link,
    /// as if a concurrent login for the same identity landed first.
    struct ContestedSocialAuthRepository {
        inner: InMemorySocialAuthRepository,
        rival: Uuid,
    }

    impl SocialAuthRepository for ContestedSocialAuthRepository {
        fn find_by_provider_id(
            &self,
            provider: SocialProvider,
            provider_id: &str,
        ) -> AuthResult<Option<SocialAuth>> {
            self.inner.find_by_provider_id(provider, provider_id)
        }

        fn find_by_user_id(&self, user_id: Uuid) -> AuthResult<Vec<SocialAuth>> {
            self.inner.find_by_user_id(user_id)
        }

        fn create(&self, link: &SocialAuth) -> AuthResult<()> {
            let mut rival = link.clone();
            rival.id = Uuid::new_v4();
            rival.user_id = self.rival;
            let _ = self.inner.create(&rival);
            self.inner.create(link)
        }
    }

    #[test]
    fn test_social_login_link_race_resolves_to_winner() {
        let config = AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests")
            .expect("test config is valid");
        let users = Arc::new(InMemoryUserRepository::new());
        let rival = User::new(None, "rival".to_string(), None);
        users.create(&rival).unwrap();

        let service = AuthService::new(
            &config,
            users,
            Arc::new(InMemoryRefreshTokenRepository::new()),
            Arc::new(InMemoryVerificationTokenRepository::new()),
            Arc::new(ContestedSocialAuthRepository {
                inner: InMemorySocialAuthRepository::new(),
                rival: rival.id,
            }),
            Arc::new(StubProviderGateway),
            Arc::new(CapturingEmailSender::new()),
        );

        // The loser of the link race lands on the winner's account
        let payload = service
            .social_login(SocialProvider::Google, "code-1", None)
            .unwrap();
        assert_eq!(payload.user.id, rival.id);
    }

    #[test]
    fn test_social_login_same_subject_different_provider_is_distinct() {
        let h = harness();
        let google = h
            .service
            .social_login(SocialProvider::Google, "code-1", None)
            .unwrap();
        let facebook = h
            .service
            .social_login(SocialProvider::Facebook, "code-1", None)
            .unwrap();
        assert_ne!(google.user.id, facebook.user.id);
    }

    #[test]
    fn test_social_auth_url() {
        let h = harness();
        let url = h
            .service
            .social_auth_url(SocialProvider::Google, None)
            .unwrap();
        assert!(url.contains("client_id=google-client-id"));

        assert!(matches!(
            h.service.social_auth_url(SocialProvider::Apple, None),
            Err(AuthError::ProviderNotConfigured(_))
        ));
    }

    // ==================
    // Queries
    // ==================

    #[test]
    fn test_me_and_lookups() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();

        let me = h.service.me(&ctx_for(&h.service, &payload)).unwrap();
        assert_eq!(me.id, payload.user.id);
        assert!(matches!(
            h.service.me(&AuthContext::anonymous()),
            Err(AuthError::AuthRequired)
        ));

        assert_eq!(h.service.user_by_email("a@x.com").unwrap().id, me.id);
        assert_eq!(h.service.user_by_username("alice").unwrap().id, me.id);
        assert!(matches!(
            h.service.user_by_id(Uuid::new_v4()),
            Err(AuthError::UserNotFound)
        ));
    }

    #[test]
    fn test_verify_token_shapes() {
        let h = harness();
        let payload = h.service.register(register_input()).unwrap();

        let good = h.service.verify_token(&payload.access_token);
        assert!(good.valid);
        assert_eq!(good.user_id, Some(payload.user.id));
        assert!(good.error.is_none());

        let bad = h.service.verify_token("garbage");
        assert!(!bad.valid);
        assert!(bad.user_id.is_none());
        assert!(bad.error.is_some());
    }

    #[test]
    fn test_guest_username_shape() {
        let name = guest_username();
        assert!(name.starts_with("guest"));
        assert_eq!(name.len(), 11);
    }

    #[test]
    fn test_username_base_derivation() {
        assert_eq!(username_base(Some("Ana María!")), "anamara");
        assert_eq!(username_base(Some("")), "user");
        assert_eq!(username_base(None), "user");
    }
}

