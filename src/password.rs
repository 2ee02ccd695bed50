// Password hashing and verification

use crate::error::AuthError;
use async_trait::async_trait;
use bcrypt::{hash, verify};

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Hash a password with bcrypt.
///
/// The salt is random per call and embedded in the returned `$2b$` string. Runs on
/// the blocking pool since bcrypt is deliberately slow.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || {
        hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("Task join error: {}", e)))?
}

/// Verify a password against a stored bcrypt hash.
///
/// Returns `Ok(false)` on mismatch. A hash that is not valid bcrypt is an error.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || {
        verify(password, &hash).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("Task join error: {}", e)))?
}

/// Reject passwords bcrypt cannot store faithfully.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password must not be empty".to_string());
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

/// PasswordVerifier
///
/// Compares a login password against a stored hash.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// The production verifier: bcrypt on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct BcryptVerifier;

#[async_trait]
impl PasswordVerifier for BcryptVerifier {
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        verify_password(password, hash).await
    }
}
