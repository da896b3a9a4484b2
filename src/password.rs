//! Password hashing.
//!
//! argon2id with a random salt per hash, stored in PHC string form.
//! Verification compares in constant time. Both operations are CPU bound and
//! run on the blocking pool.

use std::sync::OnceLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed")]
    HashingFailed,
    #[error("invalid password hash format")]
    InvalidHashFormat,
    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Hash compared against when the account does not exist, so an unknown
/// email costs the same as a wrong password.
static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| hash_password_blocking("dummy-password-for-timing").ok())
        .as_deref()
}

/// Compute the dummy hash ahead of the first request, so the first
/// unknown-email login costs one verification like every later one.
pub fn prepare_dummy_hash() {
    dummy_hash();
}

#[cfg(test)]
pub(crate) fn dummy_hash_prepared() -> bool {
    DUMMY_HASH.get().is_some_and(Option::is_some)
}

pub fn hash_password_blocking(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashingFailed)
}

/// Returns Ok(false) on mismatch; errors only on a malformed stored hash.
pub fn verify_password_blocking(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password)).await?
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash)).await?
}

/// Burn one verification against a fixed hash. Always reports a mismatch.
pub async fn verify_dummy(password: &str) {
    let password = password.to_owned();
    let _ = tokio::task::spawn_blocking(move || {
        if let Some(hash) = dummy_hash() {
            let _ = verify_password_blocking(&password, hash);
        }
    })
    .await;
}
