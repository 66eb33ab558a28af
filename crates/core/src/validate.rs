//! Field validation rules shared by entities and use cases.
//!
//! Minimum/maximum lengths are counted in characters, not bytes.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DomainError, DomainResult};

pub const MIN_NAME_LENGTH: usize = 5;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MIN_USERNAME_LENGTH: usize = 5;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_ROLE_NAME_LENGTH: usize = 4;
pub const MAX_ROLE_NAME_LENGTH: usize = 100;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 128;
const MIN_EMAIL_LENGTH: usize = 3;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex compiles")
});

/// Returns true when `email` looks like `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    email.len() >= MIN_EMAIL_LENGTH && EMAIL_RE.is_match(email)
}

/// Check that `value` has between `min` and `max` characters.
pub fn length(field: &str, value: &str, min: usize, max: usize) -> DomainResult<()> {
    let len = value.chars().count();
    if len < min {
        return Err(DomainError::validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn email(value: &str) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::validation("email is required"));
    }
    if !is_valid_email(value) {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("user@domain"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn length_counts_characters() {
        assert!(length("name", "Jos\u{e9}", 4, 10).is_ok());
        let err = length("username", "abc", MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("username must be at least 5 characters")
        );
    }
}
