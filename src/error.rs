use crate::context::Interrupted;
use crate::db::StoreError;
use crate::jwt::JwtError;
use crate::mailer::MailError;
use crate::password::PasswordError;

/// Error categories the transport boundary maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    NotFound,
    Conflict,
    PreconditionFailed,
    Expired,
    Internal,
    Cancelled,
    DeadlineExceeded,
}

/// Errors returned by the session and password reset protocols.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    Validation(&'static str),
    /// Same value for an unknown email and a wrong password
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("reset token not found")]
    TokenNotFound,
    #[error("reset token already used")]
    TokenAlreadyUsed,
    #[error("reset token expired")]
    TokenExpired,
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("signing error: {0}")]
    Signing(#[from] JwtError),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
    #[error("password hashing error: {0}")]
    Hashing(#[from] PasswordError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                ErrorKind::Unauthenticated
            }
            AuthError::UserAlreadyExists => ErrorKind::Conflict,
            AuthError::TokenNotFound => ErrorKind::NotFound,
            AuthError::TokenAlreadyUsed => ErrorKind::PreconditionFailed,
            AuthError::TokenExpired => ErrorKind::Expired,
            AuthError::Interrupted(Interrupted::Cancelled) => ErrorKind::Cancelled,
            AuthError::Interrupted(Interrupted::DeadlineExceeded) => ErrorKind::DeadlineExceeded,
            AuthError::Store(_)
            | AuthError::Signing(_)
            | AuthError::Mail(_)
            | AuthError::Hashing(_)
            | AuthError::Internal(_) => ErrorKind::Internal,
        }
    }
}
