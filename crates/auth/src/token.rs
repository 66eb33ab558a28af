use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::claims::{SessionClaims, TokenError, validate_claims};

/// Which key pair signs (and must verify) an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyClass {
    Access,
    Refresh,
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// RSA signing + verification keys for one class.
#[derive(Clone)]
pub struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, TokenError> {
        let encoding =
            EncodingKey::from_rsa_pem(private_pem).map_err(|e| TokenError::Key(e.to_string()))?;
        let decoding =
            DecodingKey::from_rsa_pem(public_pem).map_err(|e| TokenError::Key(e.to_string()))?;
        Ok(Self { encoding, decoding })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyPair(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies RS256 session envelopes with two independent key pairs.
#[derive(Debug, Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(access: KeyPair, refresh: KeyPair, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access,
            refresh,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn ttl(&self, class: KeyClass) -> Duration {
        match class {
            KeyClass::Access => self.access_ttl,
            KeyClass::Refresh => self.refresh_ttl,
        }
    }

    /// Longest window any envelope can stay valid for.
    pub fn max_ttl(&self) -> Duration {
        self.access_ttl.max(self.refresh_ttl)
    }

    fn keys(&self, class: KeyClass) -> &KeyPair {
        match class {
            KeyClass::Access => &self.access,
            KeyClass::Refresh => &self.refresh,
        }
    }

    pub fn sign(
        &self,
        class: KeyClass,
        session_token: &str,
        expiration_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let exp = expiration_enabled.then(|| iat + self.ttl(class).as_secs() as i64);
        let claims = SessionClaims {
            token: session_token.to_string(),
            iat,
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.keys(class).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue an access and a refresh envelope over the same session reference.
    pub fn sign_pair(
        &self,
        session_token: &str,
        expiration_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign(KeyClass::Access, session_token, expiration_enabled, now)?,
            refresh_token: self.sign(KeyClass::Refresh, session_token, expiration_enabled, now)?,
        })
    }

    /// Verify the signature with the `class` key, then check the claims at `now`.
    pub fn verify(
        &self,
        raw: &str,
        class: KeyClass,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        // Expiry is optional and checked against the caller's clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let data = jsonwebtoken::decode::<SessionClaims>(raw, &self.keys(class).decoding, &validation)
            .map_err(map_jwt_error)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }

    /// Try the access key first, then the refresh key.
    ///
    /// Only a signature mismatch falls through to the second key; any other
    /// failure on a correctly signed envelope is returned as-is.
    pub fn verify_any(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<(KeyClass, SessionClaims), TokenError> {
        match self.verify(raw, KeyClass::Access, now) {
            Ok(claims) => Ok((KeyClass::Access, claims)),
            Err(TokenError::SignatureInvalid) => self
                .verify(raw, KeyClass::Refresh, now)
                .map(|claims| (KeyClass::Refresh, claims)),
            Err(other) => Err(other),
        }
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_) => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;
    use crate::testutil;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn access_envelope_round_trips_with_expiry() {
        let svc = testutil::token_service();
        let now = at(1_700_000_000);
        let raw = svc.sign(KeyClass::Access, "ref-123", true, now).unwrap();

        let claims = svc.verify(&raw, KeyClass::Access, now).unwrap();
        assert_eq!(claims.token, "ref-123");
        assert_eq!(claims.exp, Some(now.timestamp() + 15 * 60));
    }

    #[test]
    fn refresh_envelope_fails_access_verification() {
        let svc = testutil::token_service();
        let now = Utc::now();
        let pair = svc.sign_pair("ref-123", true, now).unwrap();

        assert_eq!(
            svc.verify(&pair.refresh_token, KeyClass::Access, now),
            Err(TokenError::SignatureInvalid)
        );
        assert_eq!(
            svc.verify(&pair.access_token, KeyClass::Refresh, now),
            Err(TokenError::SignatureInvalid)
        );
        assert!(svc.verify(&pair.refresh_token, KeyClass::Refresh, now).is_ok());
    }

    #[test]
    fn expired_envelope_is_rejected() {
        let svc = testutil::token_service();
        let issued = at(1_700_000_000);
        let raw = svc.sign(KeyClass::Access, "ref", true, issued).unwrap();
        let later = at(issued.timestamp() + 15 * 60);
        assert_eq!(svc.verify(&raw, KeyClass::Access, later), Err(TokenError::Expired));
    }

    #[test]
    fn non_expiring_envelope_has_no_exp() {
        let svc = testutil::token_service();
        let raw = svc.sign(KeyClass::Refresh, "ref", false, at(1_000)).unwrap();
        let claims = svc.verify(&raw, KeyClass::Refresh, at(4_000_000_000)).unwrap();
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn garbage_and_tampered_envelopes() {
        let svc = testutil::token_service();
        let now = Utc::now();
        assert_eq!(svc.verify("not.a.jwt", KeyClass::Access, now), Err(TokenError::Malformed));

        let raw = svc.sign(KeyClass::Access, "ref", true, now).unwrap();
        let mut tampered = raw.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(svc.verify(&tampered, KeyClass::Access, now).is_err());
    }

    #[test]
    fn hmac_envelope_is_refused() {
        let svc = testutil::token_service();
        let claims = SessionClaims { token: "ref".into(), iat: 0, exp: None };
        let raw = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();
        assert_eq!(
            svc.verify(&raw, KeyClass::Access, Utc::now()),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn correctly_signed_payload_without_reference_is_malformed() {
        let svc = testutil::token_service();
        let key = EncodingKey::from_rsa_pem(testutil::ACCESS_PRIVATE_PEM.as_bytes()).unwrap();
        let raw = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &serde_json::json!({ "iat": 0 }),
            &key,
        )
        .unwrap();
        assert_eq!(
            svc.verify(&raw, KeyClass::Access, Utc::now()),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn verify_any_reports_the_matching_class() {
        let svc = testutil::token_service();
        let now = Utc::now();
        let pair = svc.sign_pair("ref", true, now).unwrap();
        assert_eq!(svc.verify_any(&pair.access_token, now).unwrap().0, KeyClass::Access);
        assert_eq!(svc.verify_any(&pair.refresh_token, now).unwrap().0, KeyClass::Refresh);
    }

    #[test]
    fn bad_pem_is_a_key_error() {
        assert!(matches!(
            KeyPair::from_rsa_pem(b"nope", b"nope"),
            Err(TokenError::Key(_))
        ));
    }
}
