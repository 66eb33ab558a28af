//! Statically typed process configuration read from the environment.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use gatehouse_auth::{KeyPair, TokenError, TokenService};

use crate::cache::CacheConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// PEM key material for one signing class.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_pem: Vec<u8>,
    pub public_pem: Vec<u8>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

impl KeyMaterial {
    pub fn key_pair(&self) -> Result<KeyPair, TokenError> {
        KeyPair::from_rsa_pem(&self.private_pem, &self.public_pem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_port: u16,
    pub access_keys: KeyMaterial,
    pub refresh_keys: KeyMaterial,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub cache_ttl: Duration,
    pub cache_populate_timeout: Duration,
    pub request_timeout: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let duration = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                Some(raw) => parse_duration(&raw).map_err(|reason| invalid(key, reason)),
                None => Ok(default),
            }
        };

        let pem = |key: &'static str| -> Result<Vec<u8>, ConfigError> {
            let raw = get(key).ok_or(ConfigError::Missing(key))?;
            STANDARD
                .decode(raw.as_bytes())
                .map_err(|e| invalid(key, format!("not base64: {e}")))
        };

        let api_port = match get("API_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| invalid("API_PORT", e.to_string()))?,
            None => 9999,
        };

        let config = Self {
            api_port,
            access_keys: KeyMaterial {
                private_pem: pem("ACCESS_TOKEN_PRIVATE_KEY")?,
                public_pem: pem("ACCESS_TOKEN_PUBLIC_KEY")?,
            },
            refresh_keys: KeyMaterial {
                private_pem: pem("REFRESH_TOKEN_PRIVATE_KEY")?,
                public_pem: pem("REFRESH_TOKEN_PUBLIC_KEY")?,
            },
            access_ttl: duration("ACCESS_TOKEN_EXPIRE", Duration::from_secs(15 * 60))?,
            refresh_ttl: duration("REFRESH_TOKEN_EXPIRE", Duration::from_secs(60 * 60))?,
            cache_ttl: duration("CACHE_TTL", Duration::from_secs(10 * 60))?,
            cache_populate_timeout: duration("CACHE_POPULATE_TIMEOUT", Duration::from_secs(5))?,
            request_timeout: duration("REQUEST_TIMEOUT", Duration::from_secs(10))?,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
        };

        if config.refresh_ttl < config.access_ttl {
            return Err(invalid(
                "REFRESH_TOKEN_EXPIRE",
                "refresh window must not be shorter than the access window",
            ));
        }
        Ok(config)
    }

    pub fn token_service(&self) -> Result<TokenService, TokenError> {
        Ok(TokenService::new(
            self.access_keys.key_pair()?,
            self.refresh_keys.key_pair()?,
            self.access_ttl,
            self.refresh_ttl,
        ))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .ttl(self.cache_ttl)
            .populate_timeout(self.cache_populate_timeout)
    }
}

/// Parse `<n>ms`, `<n>s`, `<n>m` or `<n>h`. Zero is rejected.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{raw}' (use ms, s, m or h)"))?;
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid number in '{raw}'"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        other => return Err(format!("unknown unit '{other}' (use ms, s, m or h)")),
    };
    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use gatehouse_auth::testutil;

    use super::*;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("ACCESS_TOKEN_PRIVATE_KEY", STANDARD.encode(testutil::ACCESS_PRIVATE_PEM)),
            ("ACCESS_TOKEN_PUBLIC_KEY", STANDARD.encode(testutil::ACCESS_PUBLIC_PEM)),
            ("REFRESH_TOKEN_PRIVATE_KEY", STANDARD.encode(testutil::REFRESH_PRIVATE_PEM)),
            ("REFRESH_TOKEN_PUBLIC_KEY", STANDARD.encode(testutil::REFRESH_PUBLIC_PEM)),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.api_port, 9999);
        assert_eq!(config.access_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_ttl, Duration::from_secs(3600));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.database_url, None);
        assert!(config.token_service().is_ok());
    }

    #[test]
    fn missing_keys_are_reported() {
        let mut env = base_env();
        env.remove("REFRESH_TOKEN_PUBLIC_KEY");
        assert_eq!(load(&env), Err(ConfigError::Missing("REFRESH_TOKEN_PUBLIC_KEY")));
    }

    #[test]
    fn refresh_shorter_than_access_is_rejected() {
        let mut env = base_env();
        env.insert("ACCESS_TOKEN_EXPIRE", "2h".into());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "REFRESH_TOKEN_EXPIRE", .. })
        ));
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("15d").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = load(&base_env()).unwrap();
        assert!(!format!("{config:?}").contains("PRIVATE KEY"));
    }
}
