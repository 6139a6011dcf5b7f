//! # Auth Error Types
//!
//! Closed error-kind enumeration for the identity service. Callers branch
//! on the variant; free-text messages never drive control flow.

use thiserror::Error;

/// Auth module result type
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth error type
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email is already registered to another user
    #[error("Email is already in use")]
    EmailInUse,

    /// Username is already taken by another user
    #[error("Username is already in use")]
    UsernameInUse,

    /// Unknown user or wrong password (intentionally indistinguishable)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Workflow requires an authenticated caller
    #[error("Authentication required")]
    AuthRequired,

    /// Refresh or verification token is missing, consumed, or expired
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Change-password supplied a wrong current password
    #[error("Current password is incorrect")]
    InvalidCurrentPassword,

    /// Convert-anonymous called on a non-anonymous account
    #[error("Account is not anonymous")]
    NotAnonymous,

    /// Target user does not exist
    #[error("User not found")]
    UserNotFound,

    /// `(provider, providerId)` pair is already linked to an account
    #[error("Social identity is already linked to an account")]
    SocialIdentityInUse,

    /// Social provider has no configuration
    #[error("Provider '{0}' is not configured")]
    ProviderNotConfigured(String),

    /// Social provider collaborator failed or returned an unusable profile
    #[error("Provider error: {0}")]
    Provider(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage failure; message is logged, never sent to the wire
    #[error("Storage error: {0}")]
    Storage(String),

    /// Password hashing or token signing failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl AuthError {
    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmailInUse => "EMAIL_IN_USE",
            Self::UsernameInUse => "USERNAME_IN_USE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            Self::InvalidCurrentPassword => "INVALID_CURRENT_PASSWORD",
            Self::NotAnonymous => "NOT_ANONYMOUS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::SocialIdentityInUse => "SOCIAL_IDENTITY_IN_USE",
            Self::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "INTERNAL_ERROR",
            Self::Crypto(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for API responses
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmailInUse | Self::UsernameInUse | Self::NotAnonymous
            | Self::SocialIdentityInUse => 409,
            Self::InvalidCredentials | Self::AuthRequired | Self::InvalidOrExpiredToken => 401,
            Self::InvalidCurrentPassword | Self::Validation(_) | Self::ProviderNotConfigured(_) => {
                400
            }
            Self::UserNotFound => 404,
            Self::Provider(_) => 502,
            Self::Storage(_) | Self::Crypto(_) => 500,
        }
    }

    /// Whether the wire response may carry the display message.
    ///
    /// Infrastructure details stay in the logs.
    pub fn is_public(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Crypto(_))
    }
}
