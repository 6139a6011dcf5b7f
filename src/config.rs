//! # Service Configuration
//!
//! Environment-driven configuration, validated in full at startup.
//! A missing or reused signing secret is a startup failure; there is no
//! development fallback secret.

use chrono::Duration;

use crate::auth::social::{SocialProvider, SocialProviderConfig};

/// Environment variable carrying the access-token signing secret
pub const ENV_ACCESS_TOKEN_SECRET: &str = "MOODHUG_ACCESS_TOKEN_SECRET";
/// Environment variable carrying the refresh-token signing secret
pub const ENV_REFRESH_TOKEN_SECRET: &str = "MOODHUG_REFRESH_TOKEN_SECRET";

/// A rejected configuration value
#[derive(Debug)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid configuration for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration consumed by the identity core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Signing secret for access tokens
    pub access_token_secret: String,
    /// Signing secret for refresh tokens; must differ from the access secret
    pub refresh_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub email_verification_ttl: Duration,
    pub password_reset_ttl: Duration,
    /// Static OAuth configuration per enabled provider
    pub providers: Vec<SocialProviderConfig>,
}

impl AuthConfig {
    /// Build a config with reference lifetimes and no providers.
    ///
    /// Secrets are still validated; use this from tests and embedders.
    pub fn new(
        access_token_secret: impl Into<String>,
        refresh_token_secret: impl Into<String>,
    ) -> Result<Self, Vec<ConfigError>> {
        let config = Self {
            access_token_secret: access_token_secret.into(),
            refresh_token_secret: refresh_token_secret.into(),
            access_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(7),
            email_verification_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            providers: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from the environment.
    ///
    /// All problems are collected before reporting so an operator fixes
    /// the whole file in one pass.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        let access = std::env::var(ENV_ACCESS_TOKEN_SECRET).unwrap_or_default();
        let refresh = std::env::var(ENV_REFRESH_TOKEN_SECRET).unwrap_or_default();

        let mut providers = Vec::new();
        for provider in [
            SocialProvider::Google,
            SocialProvider::Facebook,
            SocialProvider::Apple,
        ] {
            let prefix = format!("MOODHUG_{}", provider.to_string().to_uppercase());
            let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok();
            let redirect = std::env::var(format!("{}_REDIRECT_URI", prefix)).ok();
            if let (Some(client_id), Some(redirect)) = (client_id, redirect) {
                providers.push(SocialProviderConfig::new(provider, client_id, redirect));
            }
        }

        let config = Self {
            access_token_secret: access,
            refresh_token_secret: refresh,
            access_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(7),
            email_verification_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            providers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole config, collecting every error
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.access_token_secret.is_empty() {
            errors.push(ConfigError {
                field: ENV_ACCESS_TOKEN_SECRET.to_string(),
                message: "signing secret must be set; there is no default".to_string(),
            });
        }
        if self.refresh_token_secret.is_empty() {
            errors.push(ConfigError {
                field: ENV_REFRESH_TOKEN_SECRET.to_string(),
                message: "signing secret must be set; there is no default".to_string(),
            });
        }
        if !self.access_token_secret.is_empty()
            && self.access_token_secret == self.refresh_token_secret
        {
            errors.push(ConfigError {
                field: ENV_REFRESH_TOKEN_SECRET.to_string(),
                message: "refresh secret must differ from the access secret".to_string(),
            });
        }
        if self.access_token_ttl <= Duration::zero() {
            errors.push(ConfigError {
                field: "access_token_ttl".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.refresh_token_ttl <= self.access_token_ttl {
            errors.push(ConfigError {
                field: "refresh_token_ttl".to_string(),
                message: "must exceed the access token lifetime".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
