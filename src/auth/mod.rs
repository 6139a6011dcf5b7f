//! # MoodHug Identity & Token Lifecycle
//!
//! Establishes who a caller is, issues and rotates credentials, and
//! reconciles password accounts, anonymous guest sessions, and social
//! logins into a single durable user identity.

pub mod context;
pub mod crypto;
pub mod email;
pub mod errors;
pub mod jwt;
pub mod refresh;
pub mod service;
pub mod social;
pub mod user;
pub mod verification;

pub use context::AuthContext;
pub use email::{EmailSender, EmailTemplate, LogEmailSender};
pub use errors::{AuthError, AuthResult};
pub use jwt::{AccessClaims, JwtManager, RefreshClaims};
pub use refresh::{InMemoryRefreshTokenRepository, RefreshToken, RefreshTokenRepository};
pub use service::{
    AuthPayload, AuthService, ConvertAnonymousInput, LoginInput, RegisterInput, TokenVerification,
};
pub use social::{
    InMemorySocialAuthRepository, ProviderGateway, SocialAuth, SocialAuthRepository,
    SocialProfile, SocialProvider, SocialProviderConfig, StubProviderGateway,
};
pub use user::{InMemoryUserRepository, User, UserRepository};
pub use verification::{
    InMemoryVerificationTokenRepository, VerificationKind, VerificationToken,
    VerificationTokenRepository,
};
