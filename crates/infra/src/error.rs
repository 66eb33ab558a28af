//! Error taxonomy surfaced by the use cases.

use thiserror::Error;

use gatehouse_auth::{AuthzError, PasswordError, TokenError};
use gatehouse_core::DomainError;

use crate::revocation::RevocationError;
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Missing, invalid, expired or revoked credential.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Credential disabled, or no password chosen yet.
    #[error("principal disabled")]
    DisabledPrincipal,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Detail for logs only.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record"),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound => Self::NotFound("record"),
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort | PasswordError::TooLong => Self::Validation(err.to_string()),
            PasswordError::Hash(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SignatureInvalid | TokenError::Malformed | TokenError::Expired => {
                Self::Unauthenticated
            }
            TokenError::Key(msg) | TokenError::Signing(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => Self::Unauthenticated,
            AuthzError::Forbidden(permission) => Self::Forbidden(permission),
        }
    }
}

/// Registry failures on the authentication path fail closed.
impl From<RevocationError> for ServiceError {
    fn from(_: RevocationError) -> Self {
        Self::Unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthenticated() {
        for err in [TokenError::SignatureInvalid, TokenError::Malformed, TokenError::Expired] {
            assert_eq!(ServiceError::from(err), ServiceError::Unauthenticated);
        }
        assert!(matches!(
            ServiceError::from(TokenError::Signing("boom".into())),
            ServiceError::Internal(_)
        ));
    }

    #[test]
    fn registry_outage_fails_closed() {
        let err = RevocationError::Unavailable("connection refused".into());
        assert_eq!(ServiceError::from(err), ServiceError::Unauthenticated);
    }

    #[test]
    fn store_errors_keep_their_kind() {
        assert_eq!(
            ServiceError::from(StoreError::Conflict("email already exists".into())),
            ServiceError::Conflict("email already exists".into())
        );
        assert!(matches!(
            ServiceError::from(StoreError::Backend("io".into())),
            ServiceError::Internal(_)
        ));
    }
}
