//! Token policy: one signing secret and TTL per token purpose.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a signed token is for. Each purpose has its own secret, so a token
/// minted for one purpose never verifies under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Short-lived token authorizing ordinary calls
    Access,
    /// Long-lived token used to rotate the session's token pair
    Refresh,
    /// Single-use token embedded in a password reset link
    PasswordReset,
}

impl TokenPurpose {
    pub const ALL: [TokenPurpose; 3] = [
        TokenPurpose::Access,
        TokenPurpose::Refresh,
        TokenPurpose::PasswordReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signing secret and lifetime for one token purpose.
#[derive(Clone)]
pub struct TokenSettings {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSettings {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// Never print secrets.
impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Issuer plus the settings for every token purpose.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    issuer: String,
    access: TokenSettings,
    refresh: TokenSettings,
    password_reset: TokenSettings,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("issuer must not be empty")]
    EmptyIssuer,
    #[error("{0} token secret must not be empty")]
    EmptySecret(TokenPurpose),
    #[error("{0} token ttl must be greater than zero")]
    ZeroTtl(TokenPurpose),
    #[error("{0} and {1} tokens must use distinct secrets")]
    SharedSecret(TokenPurpose, TokenPurpose),
}

impl TokenPolicy {
    /// Build a policy, rejecting empty secrets, zero TTLs and secrets shared
    /// between purposes.
    pub fn new(
        issuer: impl Into<String>,
        access: TokenSettings,
        refresh: TokenSettings,
        password_reset: TokenSettings,
    ) -> Result<Self, ConfigError> {
        let policy = Self {
            issuer: issuer.into(),
            access,
            refresh,
            password_reset,
        };

        if policy.issuer.trim().is_empty() {
            return Err(ConfigError::EmptyIssuer);
        }

        for purpose in TokenPurpose::ALL {
            let settings = policy.settings(purpose);
            if settings.secret.is_empty() {
                return Err(ConfigError::EmptySecret(purpose));
            }
            if settings.ttl.is_zero() {
                return Err(ConfigError::ZeroTtl(purpose));
            }
        }

        for (i, a) in TokenPurpose::ALL.iter().enumerate() {
            for b in &TokenPurpose::ALL[i + 1..] {
                if policy.settings(*a).secret == policy.settings(*b).secret {
                    return Err(ConfigError::SharedSecret(*a, *b));
                }
            }
        }

        Ok(policy)
    }

    /// Issuer string, also the only accepted audience.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn settings(&self, purpose: TokenPurpose) -> &TokenSettings {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
            TokenPurpose::PasswordReset => &self.password_reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str, secs: u64) -> TokenSettings {
        TokenSettings::new(secret.as_bytes(), Duration::from_secs(secs))
    }

    #[test]
    fn test_valid_policy() {
        let policy = TokenPolicy::new(
            "sessiongate",
            settings("access-secret", 60),
            settings("refresh-secret", 3600),
            settings("reset-secret", 900),
        )
        .unwrap();

        assert_eq!(policy.issuer(), "sessiongate");
        assert_eq!(
            policy.settings(TokenPurpose::Refresh).ttl(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            policy.settings(TokenPurpose::PasswordReset).secret(),
            b"reset-secret"
        );
    }

    #[test]
    fn test_shared_secret_rejected() {
        let result = TokenPolicy::new(
            "sessiongate",
            settings("same", 60),
            settings("refresh-secret", 3600),
            settings("same", 900),
        );
        assert_eq!(
            result.unwrap_err(),
            ConfigError::SharedSecret(TokenPurpose::Access, TokenPurpose::PasswordReset)
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = TokenPolicy::new(
            "sessiongate",
            settings("a", 60),
            settings("b", 0),
            settings("c", 900),
        );
        assert_eq!(result.unwrap_err(), ConfigError::ZeroTtl(TokenPurpose::Refresh));
    }

    #[test]
    fn test_empty_issuer_rejected() {
        let result = TokenPolicy::new(" ", settings("a", 1), settings("b", 1), settings("c", 1));
        assert_eq!(result.unwrap_err(), ConfigError::EmptyIssuer);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let printed = format!("{:?}", settings("super-secret-value", 60));
        assert!(!printed.contains("super-secret-value"));
    }
}
