//! Advisory key/value cache and the read-through helpers built on it.
//!
//! The cache is never a source of truth: read failures degrade to a miss and
//! write failures are logged and dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod cached_store;
#[cfg(feature = "redis")]
pub mod redis_cache;

pub use cached_store::{CachedRoleStore, CachedUserStore};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Minimal byte-oriented cache port (`GET`, `SET .. PX`, `DEL`).
#[async_trait::async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;
}

#[async_trait::async_trait]
impl<C> CacheClient for Arc<C>
where
    C: CacheClient + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        (**self).del(keys).await
    }
}

/// `{kind}:{dimension}:{value}`, e.g. `user:token:…`.
pub fn key(kind: &str, dimension: &str, value: impl std::fmt::Display) -> String {
    format!("{kind}:{dimension}:{value}")
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory client
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local cache with per-entry expiry.
///
/// Can be switched unavailable to simulate an unreachable cache server.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
    unavailable: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Live (unexpired) key count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|map| map.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|map| map.get(key).is_some_and(|(_, exp)| *exp > now))
            .unwrap_or(false)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("in-memory cache switched off".into()))
        } else {
            Ok(())
        }
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        match map.get(key) {
            Some((value, exp)) if *exp > now => Ok(Some(value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        map.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check()?;
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read-through policy
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_POPULATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    ttl: Duration,
    populate_timeout: Duration,
    detached: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            populate_timeout: DEFAULT_POPULATE_TIMEOUT,
            detached: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn populate_timeout(mut self, timeout: Duration) -> Self {
        self.populate_timeout = timeout;
        self
    }

    /// Populate on a spawned task (default) or inline before returning.
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    pub fn entry_ttl(&self) -> Duration {
        self.ttl
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Populate tickets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Slot {
    holders: usize,
    generation: u64,
}

/// Per-key write generations for keys with a populate in flight.
///
/// Only keys somebody holds a ticket for are tracked; a slot disappears with
/// its last ticket.
#[derive(Debug, Default)]
struct Generations {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Generations {
    fn acquire(&self, key: &str) -> u64 {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.to_string()).or_default();
        slot.holders += 1;
        slot.generation
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(key) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                slots.remove(key);
            }
        }
    }

    fn current(&self, key: &str) -> Option<u64> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|slot| slot.generation)
    }

    fn bump(&self, keys: &[String]) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if let Some(slot) = slots.get_mut(key) {
                slot.generation += 1;
            }
        }
    }
}

/// Permission to populate one key, taken before the backing store is read.
///
/// An invalidation of the key after the ticket was taken makes it stale, and
/// a stale ticket never leaves an entry behind.
#[derive(Debug)]
pub struct PopulateTicket {
    key: String,
    generation: u64,
    generations: Arc<Generations>,
}

impl PopulateTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_current(&self) -> bool {
        self.generations.current(&self.key) == Some(self.generation)
    }
}

impl Drop for PopulateTicket {
    fn drop(&mut self) {
        self.generations.release(&self.key);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read-through helper
// ─────────────────────────────────────────────────────────────────────────────

/// Shared read-through/invalidate behaviour for the cached stores.
///
/// Clones share their populate tickets, so every decorator over one cache
/// must be built from clones of the same `ReadThrough`.
#[derive(Clone)]
pub struct ReadThrough {
    client: Arc<dyn CacheClient>,
    config: CacheConfig,
    generations: Arc<Generations>,
}

impl std::fmt::Debug for ReadThrough {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThrough").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ReadThrough {
    pub fn new(client: Arc<dyn CacheClient>, config: CacheConfig) -> Self {
        Self {
            client,
            config,
            generations: Arc::new(Generations::default()),
        }
    }

    /// Cached value under `key`; any failure counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.client.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed; falling through to store");
                None
            }
        }
    }

    /// Reserve `key` for a later [`populate`](Self::populate).
    ///
    /// Take the ticket before reading the backing store: a write that lands
    /// after this point invalidates the key and voids the ticket.
    pub fn begin(&self, key: impl Into<String>) -> PopulateTicket {
        let key = key.into();
        let generation = self.generations.acquire(&key);
        PopulateTicket {
            key,
            generation,
            generations: self.generations.clone(),
        }
    }

    /// Store `value` under the ticket's key with the configured TTL.
    ///
    /// Never fails the caller. When detached, the write runs on its own task
    /// bounded by the populate timeout and outlives the calling request. A
    /// stale ticket skips the write; one that goes stale while the write is in
    /// flight deletes the entry it just wrote.
    pub async fn populate<T: Serialize>(&self, ticket: PopulateTicket, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %ticket.key, error = %e, "cache serialization failed");
                return;
            }
        };

        let client = self.client.clone();
        let ttl = self.config.ttl;
        let timeout = self.config.populate_timeout;
        let write = async move {
            if !ticket.is_current() {
                debug!(key = %ticket.key, "skipping populate of invalidated key");
                return;
            }
            match tokio::time::timeout(timeout, client.set(&ticket.key, bytes, ttl)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(key = %ticket.key, error = %e, "cache populate failed"),
                Err(_) => warn!(key = %ticket.key, "cache populate timed out"),
            }
            if !ticket.is_current() {
                debug!(key = %ticket.key, "key invalidated during populate");
                let keys = [ticket.key.clone()];
                if let Err(e) = client.del(&keys).await {
                    warn!(key = %ticket.key, error = %e, "cache invalidation failed");
                }
            }
        };

        if self.config.detached {
            tokio::spawn(write);
        } else {
            write.await;
        }
    }

    /// Delete every key; failures are logged and dropped.
    ///
    /// Outstanding populate tickets for these keys go stale first.
    pub async fn invalidate(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        self.generations.bump(&keys);
        if let Err(e) = self.client.del(&keys).await {
            warn!(keys = ?keys, error = %e, "cache invalidation failed");
        }
    }
}
