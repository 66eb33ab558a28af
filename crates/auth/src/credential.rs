use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::password::{self, PasswordError};

/// Secret material and lifecycle flags belonging to exactly one user.
///
/// `token` is the stable session reference embedded in every signed
/// envelope; it is minted lazily on first login and cleared on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub status: bool,
    pub password_hash: Option<String>,
    pub token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(status: bool, now: DateTime<Utc>) -> Self {
        Self {
            status,
            password_hash: None,
            token: None,
            updated_at: now,
        }
    }

    pub fn set_password(&mut self, plain: &str, now: DateTime<Utc>) -> Result<(), PasswordError> {
        self.password_hash = Some(password::hash_password(plain)?);
        self.updated_at = now;
        Ok(())
    }

    /// Never true while no password has been set. Costs one Argon2
    /// verification either way.
    pub fn verify_password(&self, plain: &str) -> bool {
        match self.password_hash.as_deref() {
            Some(hash) => password::verify_password(plain, hash),
            None => password::verify_without_hash(plain),
        }
    }

    /// Drop the password and the session reference; the user must set a new
    /// password before the next login.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.password_hash = None;
        self.token = None;
        self.updated_at = now;
    }

    pub fn set_token(&mut self, token: impl Into<String>, now: DateTime<Utc>) {
        self.token = Some(token.into());
        self.updated_at = now;
    }

    pub fn clear_token(&mut self, now: DateTime<Utc>) {
        self.token = None;
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: bool, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    pub fn enable(&mut self, now: DateTime<Utc>) {
        self.set_status(true, now);
    }

    pub fn disable(&mut self, now: DateTime<Utc>) {
        self.set_status(false, now);
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Enabled and able to authenticate.
    pub fn is_active(&self) -> bool {
        self.status && self.has_password()
    }

    /// Created but no password chosen yet.
    pub fn is_new(&self) -> bool {
        !self.has_password()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_from_new_to_active_to_reset() {
        let now = Utc::now();
        let mut cred = Credential::new(true, now);
        assert!(cred.is_new());
        assert!(!cred.is_active());
        assert!(!cred.verify_password("anything"));

        cred.set_password("s3cret!", now).unwrap();
        assert!(cred.is_active());
        assert!(cred.verify_password("s3cret!"));

        cred.set_token("ref-1", now);
        cred.reset(now);
        assert!(cred.is_new());
        assert_eq!(cred.token, None);
    }

    #[test]
    fn disabled_credential_is_not_active() {
        let now = Utc::now();
        let mut cred = Credential::new(true, now);
        cred.set_password("s3cret!", now).unwrap();
        cred.disable(now);
        assert!(!cred.is_active());
        assert!(cred.verify_password("s3cret!"));
        cred.enable(now);
        assert!(cred.is_active());
    }

    #[test]
    fn short_password_leaves_credential_untouched() {
        let now = Utc::now();
        let mut cred = Credential::new(true, now);
        assert_eq!(cred.set_password("abc", now), Err(PasswordError::TooShort));
        assert!(cred.is_new());
    }
}
