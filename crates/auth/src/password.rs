use std::sync::OnceLock;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use thiserror::Error;

use gatehouse_core::validate::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least 6 characters")]
    TooShort,

    #[error("password must be at most 128 characters")]
    TooLong,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Check the plaintext policy without hashing.
pub fn check_policy(plain: &str) -> Result<(), PasswordError> {
    let len = plain.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }
    Ok(())
}

/// Hash a plaintext password into a PHC string (argon2id, random salt).
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    check_policy(plain)?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Constant-time verification against a stored PHC string.
///
/// An unparsable stored hash never verifies.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| hash_password("gatehouse-dummy-password").ok())
        .as_deref()
}

/// Spend one full verification against a throwaway hash and report failure.
///
/// Used where there is no stored hash to check (unknown login, unprovisioned
/// credential) so those paths cost the same as a wrong password.
pub fn verify_without_hash(plain: &str) -> bool {
    if let Some(hash) = dummy_hash() {
        let _ = verify_password(plain, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_hashed_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn policy_bounds_are_enforced() {
        assert_eq!(hash_password("short"), Err(PasswordError::TooShort));
        assert_eq!(
            hash_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)),
            Err(PasswordError::TooLong)
        );
        assert!(check_policy("sixsix").is_ok());
    }

    #[test]
    fn verification_without_a_hash_always_fails() {
        assert!(!verify_without_hash("gatehouse-dummy-password"));
        assert!(!verify_without_hash("anything else"));
        assert!(dummy_hash().is_some_and(|hash| hash.starts_with("$argon2id$")));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
