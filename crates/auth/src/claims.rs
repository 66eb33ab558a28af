use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload of every signed envelope.
///
/// `token` is the credential's session reference, never the raw password or
/// user id; `exp` is absent when expiration was disabled at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub token: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signature invalid")]
    SignatureInvalid,

    #[error("token malformed")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Pure claim checks performed after the signature verified.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.token.trim().is_empty() {
        return Err(TokenError::Malformed);
    }

    if let Some(exp) = claims.exp {
        if exp <= claims.iat {
            return Err(TokenError::Malformed);
        }
        if now.timestamp() >= exp {
            return Err(TokenError::Expired);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: Option<i64>) -> SessionClaims {
        SessionClaims {
            token: "ref".into(),
            iat: 1_000,
            exp,
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let at = |secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
        assert!(validate_claims(&claims(Some(1_060)), at(1_059)).is_ok());
        assert_eq!(validate_claims(&claims(Some(1_060)), at(1_060)), Err(TokenError::Expired));
    }

    #[test]
    fn missing_exp_never_expires() {
        let far = DateTime::<Utc>::from_timestamp(9_999_999_999, 0).unwrap();
        assert!(validate_claims(&claims(None), far).is_ok());
    }

    #[test]
    fn empty_reference_is_malformed() {
        let mut c = claims(None);
        c.token = "  ".into();
        assert_eq!(validate_claims(&c, Utc::now()), Err(TokenError::Malformed));
    }

    #[test]
    fn exp_field_is_omitted_when_absent() {
        let json = serde_json::to_value(claims(None)).unwrap();
        assert!(json.get("exp").is_none());
    }
}
