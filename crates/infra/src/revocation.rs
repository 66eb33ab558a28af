//! Denylist of revoked session-token references.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheClient, CacheError};

const KEY_PREFIX: &str = "blacklist:";
const REVOKED: &[u8] = b"revoked";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevocationError {
    #[error("revocation registry unavailable: {0}")]
    Unavailable(String),
}

impl From<CacheError> for RevocationError {
    fn from(err: CacheError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// TTL-bounded denylist keyed by session-token reference.
///
/// Callers must treat `Err` from [`is_revoked`](Self::is_revoked) as revoked.
#[async_trait::async_trait]
pub trait RevocationRegistry: Send + Sync {
    async fn revoke(&self, reference: &str, ttl: Duration) -> Result<(), RevocationError>;
    async fn is_revoked(&self, reference: &str) -> Result<bool, RevocationError>;
}

#[async_trait::async_trait]
impl<R> RevocationRegistry for Arc<R>
where
    R: RevocationRegistry + ?Sized,
{
    async fn revoke(&self, reference: &str, ttl: Duration) -> Result<(), RevocationError> {
        (**self).revoke(reference, ttl).await
    }

    async fn is_revoked(&self, reference: &str) -> Result<bool, RevocationError> {
        (**self).is_revoked(reference).await
    }
}

pub fn revocation_key(reference: &str) -> String {
    format!("{KEY_PREFIX}{reference}")
}

/// Registry stored in the shared cache as `blacklist:{reference}` = `"revoked"`.
///
/// Unlike ordinary cache reads, failures here are surfaced, never swallowed.
#[derive(Debug, Clone)]
pub struct CacheRevocationRegistry<C> {
    cache: C,
}

impl<C> CacheRevocationRegistry<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl<C: CacheClient> RevocationRegistry for CacheRevocationRegistry<C> {
    async fn revoke(&self, reference: &str, ttl: Duration) -> Result<(), RevocationError> {
        self.cache
            .set(&revocation_key(reference), REVOKED.to_vec(), ttl)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, reference: &str) -> Result<bool, RevocationError> {
        Ok(self.cache.get(&revocation_key(reference)).await?.is_some())
    }
}
