//! Session issuance and password reset protocols.
//!
//! Services hold their collaborators behind `Arc<dyn …>` and take a
//! [`CallContext`](crate::context::CallContext) on every operation. Every store
//! and mail await runs under `ctx.guard`, so cancellation surfaces as
//! [`AuthError::Interrupted`](crate::error::AuthError::Interrupted).

mod password_reset;
mod session;

pub use password_reset::PasswordResetService;
pub use session::{Profile, SessionService, TokenPair};

use crate::error::AuthError;

/// Trimmed and lowercased, the form emails are stored and looked up in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation("email is required"));
    }
    if password.is_empty() {
        return Err(AuthError::Validation("password is required"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use url::Url;

    use super::{PasswordResetService, SessionService};
    use crate::config::{TokenPolicy, TokenSettings};
    use crate::db::MemoryStore;
    use crate::jwt::TokenAuthenticator;
    use crate::mailer::RecordingMailer;

    pub const ACCESS_SECRET: &[u8] = b"access-secret-access-secret-access";
    pub const REFRESH_SECRET: &[u8] = b"refresh-secret-refresh-secret-refresh";
    pub const RESET_SECRET: &[u8] = b"reset-secret-reset-secret-reset-secret";

    pub fn policy_with_reset_ttl(reset_ttl: Duration) -> Arc<TokenPolicy> {
        Arc::new(
            TokenPolicy::new(
                "sessiongate",
                TokenSettings::new(ACCESS_SECRET, Duration::from_secs(900)),
                TokenSettings::new(REFRESH_SECRET, Duration::from_secs(1_209_600)),
                TokenSettings::new(RESET_SECRET, reset_ttl),
            )
            .unwrap(),
        )
    }

    pub fn authenticator() -> TokenAuthenticator {
        TokenAuthenticator::new("sessiongate", "sessiongate")
    }

    pub struct Harness {
        pub store: MemoryStore,
        pub mailer: RecordingMailer,
        pub sessions: SessionService,
        pub resets: PasswordResetService,
    }

    pub fn harness_with(reset_ttl: Duration, mailer: RecordingMailer) -> Harness {
        let store = MemoryStore::new();
        let policy = policy_with_reset_ttl(reset_ttl);
        let shared = Arc::new(store.clone());

        let sessions = SessionService::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            authenticator(),
            policy.clone(),
        );
        let resets = PasswordResetService::new(
            shared.clone(),
            shared,
            Arc::new(mailer.clone()),
            authenticator(),
            policy,
            Url::parse("http://localhost:3000/reset-password").unwrap(),
        );

        Harness {
            store,
            mailer,
            sessions,
            resets,
        }
    }

    pub fn harness() -> Harness {
        harness_with(Duration::from_secs(900), RecordingMailer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_require_credentials() {
        assert!(require_credentials("a@b.c", "pw").is_ok());
        assert!(matches!(
            require_credentials("", "pw"),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            require_credentials("a@b.c", ""),
            Err(AuthError::Validation(_))
        ));
    }
}
