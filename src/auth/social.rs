//! # Social Identity
//!
//! Provider definitions, authorization-URL building, the code-exchange
//! collaborator boundary, and the SocialAuth rows mapping external
//! identities onto local users. Adding a provider means adding an enum
//! variant, not editing a shared switch elsewhere.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};

// ==================
// Providers
// ==================

/// Supported social login providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Google,
    Facebook,
    Apple,
}

impl SocialProvider {
    /// Authorization endpoint for the provider
    pub fn authorize_url(&self) -> &'static str {
        match self {
            SocialProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            SocialProvider::Facebook => "https://www.facebook.com/v18.0/dialog/oauth",
            SocialProvider::Apple => "https://appleid.apple.com/auth/authorize",
        }
    }

    /// Scopes requested when none are configured
    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            SocialProvider::Google => &["openid", "email", "profile"],
            SocialProvider::Facebook => &["email", "public_profile"],
            SocialProvider::Apple => &["name", "email"],
        }
    }
}

impl std::fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocialProvider::Google => write!(f, "google"),
            SocialProvider::Facebook => write!(f, "facebook"),
            SocialProvider::Apple => write!(f, "apple"),
        }
    }
}

impl std::str::FromStr for SocialProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(SocialProvider::Google),
            "facebook" => Ok(SocialProvider::Facebook),
            "apple" => Ok(SocialProvider::Apple),
            other => Err(AuthError::Validation(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

// ==================
// Provider Configuration
// ==================

/// Static per-provider configuration (client id, redirect base, scopes)
#[derive(Debug, Clone)]
pub struct SocialProviderConfig {
    pub provider: SocialProvider,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl SocialProviderConfig {
    pub fn new(provider: SocialProvider, client_id: String, redirect_uri: String) -> Self {
        Self {
            provider,
            client_id,
            redirect_uri,
            scopes: provider
                .default_scopes()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Build the provider's authorization URL.
    ///
    /// Pure formatting from static configuration; no state is kept.
    pub fn build_auth_url(&self, redirect_uri: Option<&str>) -> String {
        let redirect = redirect_uri.unwrap_or(&self.redirect_uri);
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect),
            ("response_type", "code"),
            ("scope", &scope),
        ];
        format!(
            "{}?{}",
            self.provider.authorize_url(),
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
        )
    }
}

// ==================
// Code Exchange Collaborator
// ==================

/// Normalized profile returned by a provider's code exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProfile {
    pub provider_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Collaborator that exchanges an authorization code for a profile.
///
/// The wire calls behind this trait are out of scope; the identity core
/// treats the exchange as opaque and synchronous.
pub trait ProviderGateway: Send + Sync {
    fn exchange_code(
        &self,
        provider: SocialProvider,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<SocialProfile>;
}

/// Development gateway deriving a deterministic placeholder profile from
/// the authorization code, so the full login flow runs without any
/// provider credentials.
pub struct StubProviderGateway;

impl ProviderGateway for StubProviderGateway {
    fn exchange_code(
        &self,
        provider: SocialProvider,
        code: &str,
        _redirect_uri: Option<&str>,
    ) -> AuthResult<SocialProfile> {
        if code.is_empty() {
            return Err(AuthError::Provider("empty authorization code".to_string()));
        }
        Ok(SocialProfile {
            provider_id: format!("{}-{}", provider, code),
            email: Some(format!("{}@{}.example", code, provider)),
            name: Some(format!("{} user", provider)),
        })
    }
}

// ==================
// SocialAuth Rows
// ==================

/// Link between an external identity and a local user.
///
/// `(provider, provider_id)` is globally unique: one external identity
/// maps to at most one local user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialAuth {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: SocialProvider,
    pub provider_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialAuth {
    pub fn new(user_id: Uuid, provider: SocialProvider, profile: &SocialProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            provider_id: profile.provider_id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository for SocialAuth rows
pub trait SocialAuthRepository: Send + Sync {
    fn find_by_provider_id(
        &self,
        provider: SocialProvider,
        provider_id: &str,
    ) -> AuthResult<Option<SocialAuth>>;

    fn find_by_user_id(&self, user_id: Uuid) -> AuthResult<Vec<SocialAuth>>;

    /// Insert a new link; returns [`AuthError::SocialIdentityInUse`] if
    /// `(provider, provider_id)` is taken
    fn create(&self, link: &SocialAuth) -> AuthResult<()>;
}

/// In-memory SocialAuth store
pub struct InMemorySocialAuthRepository {
    links: RwLock<HashMap<Uuid, SocialAuth>>,
}

impl InMemorySocialAuthRepository {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySocialAuthRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SocialAuthRepository for InMemorySocialAuthRepository {
    fn find_by_provider_id(
        &self,
        provider: SocialProvider,
        provider_id: &str,
    ) -> AuthResult<Option<SocialAuth>> {
        let links = self.links.read().unwrap();
        Ok(links
            .values()
            .find(|l| l.provider == provider && l.provider_id == provider_id)
            .cloned())
    }

    fn find_by_user_id(&self, user_id: Uuid) -> AuthResult<Vec<SocialAuth>> {
        let links = self.links.read().unwrap();
        Ok(links
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    fn create(&self, link: &SocialAuth) -> AuthResult<()> {
        let mut links = self.links.write().unwrap();
        let taken = links
            .values()
            .any(|l| l.provider == link.provider && l.provider_id == link.provider_id);
        if taken {
            return Err(AuthError::SocialIdentityInUse);
        }
        links.insert(link.id, link.clone());
        Ok(())
    }
}
