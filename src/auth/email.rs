//! # Email Collaborator Boundary
//!
//! The identity core hands raw verification tokens to an `EmailSender`;
//! actual delivery (SMTP, provider APIs) lives outside this crate.

use super::errors::AuthResult;

/// Outbound mail produced by the identity workflows
#[derive(Debug, Clone)]
pub enum EmailTemplate {
    /// Sent on registration; carries the raw email-verification token
    VerifyEmail {
        to: String,
        token: String,
        expires_hours: i64,
    },
    /// Sent on password-reset request; carries the raw reset token
    ResetPassword {
        to: String,
        token: String,
        expires_hours: i64,
    },
}

/// Outbound email collaborator
pub trait EmailSender: Send + Sync {
    fn send(&self, template: EmailTemplate) -> AuthResult<()>;
}

/// Development sender that logs instead of delivering
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, template: EmailTemplate) -> AuthResult<()> {
        match template {
            EmailTemplate::VerifyEmail { to, expires_hours, .. } => {
                tracing::info!(to = %to, expires_hours, "verification email (not delivered)");
            }
            EmailTemplate::ResetPassword { to, expires_hours, .. } => {
                tracing::info!(to = %to, expires_hours, "password reset email (not delivered)");
            }
        }
        Ok(())
    }
}

/// Test support: senders that capture instead of delivering. Used by the
/// crate's own tests and by downstream integration tests.
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures outbound mail so tests can read the raw tokens
    pub struct CapturingEmailSender {
        pub sent: Mutex<Vec<EmailTemplate>>,
    }

    impl CapturingEmailSender {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn last_token(&self) -> Option<String> {
            let sent = self.sent.lock().unwrap();
            sent.last().map(|t| match t {
                EmailTemplate::VerifyEmail { token, .. } => token.clone(),
                EmailTemplate::ResetPassword { token, .. } => token.clone(),
            })
        }
    }

    impl Default for CapturingEmailSender {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EmailSender for CapturingEmailSender {
        fn send(&self, template: EmailTemplate) -> AuthResult<()> {
            self.sent.lock().unwrap().push(template);
            Ok(())
        }
    }
}
