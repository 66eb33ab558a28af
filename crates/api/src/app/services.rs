//! Infrastructure wiring: stores, cache, revocation registry and use cases.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use gatehouse_infra::audit::{AuditRepository, Auditor, InMemoryAuditLog, PostgresAuditLog};
use gatehouse_infra::cache::{CacheClient, CachedRoleStore, CachedUserStore, InMemoryCache, ReadThrough};
#[cfg(feature = "redis")]
use gatehouse_infra::cache::RedisCache;
use gatehouse_infra::revocation::{CacheRevocationRegistry, RevocationRegistry};
use gatehouse_infra::services::{RoleService, SessionService, UserService};
use gatehouse_infra::store::{InMemoryDirectory, PostgresDirectory, RoleStore, UserStore};
use gatehouse_infra::{AppConfig, Deadline, ServiceError, ServiceResult};

/// Everything a handler needs, shared behind an `Arc`.
pub struct AppServices {
    pub session: SessionService,
    pub users: UserService,
    pub roles: RoleService,
    /// Cached user store the use cases run against.
    pub user_store: Arc<dyn UserStore>,
    /// Cached role store the use cases run against.
    pub role_store: Arc<dyn RoleStore>,
    /// Audit trail of management writes.
    pub audit: Arc<dyn AuditRepository>,
    request_timeout: Duration,
}

impl AppServices {
    /// Compose the cache decorators, the registry and the use cases over an
    /// authoritative directory, an audit log and a cache client.
    pub fn assemble(
        backends: Backends,
        cache: Arc<dyn CacheClient>,
        config: &AppConfig,
    ) -> anyhow::Result<Self> {
        let read_through = ReadThrough::new(cache.clone(), config.cache_config());
        let role_store: Arc<dyn RoleStore> =
            Arc::new(CachedRoleStore::new(backends.roles, read_through.clone()));
        let user_store: Arc<dyn UserStore> = Arc::new(
            CachedUserStore::new(backends.users, read_through).with_roles(role_store.clone()),
        );
        let revocations: Arc<dyn RevocationRegistry> = Arc::new(CacheRevocationRegistry::new(cache));
        let tokens = Arc::new(config.token_service().context("loading token signing keys")?);
        let auditor = Auditor::new(backends.audit.clone());

        Ok(Self {
            session: SessionService::new(user_store.clone(), revocations, tokens),
            users: UserService::new(user_store.clone(), role_store.clone(), auditor.clone()),
            roles: RoleService::new(role_store.clone(), auditor),
            user_store,
            role_store,
            audit: backends.audit,
            request_timeout: config.request_timeout,
        })
    }

    /// Deadline for the store and registry calls of one request.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }

    /// Run a management use case under the request deadline.
    pub async fn bounded<T>(&self, fut: impl Future<Output = ServiceResult<T>>) -> ServiceResult<T> {
        self.deadline()
            .run(fut)
            .await
            .unwrap_or_else(|_| Err(ServiceError::internal("request deadline elapsed")))
    }
}

/// Authoritative storage behind the caches.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub audit: Arc<dyn AuditRepository>,
}

impl Backends {
    /// One directory serving both stores, next to `audit`.
    pub fn from_directory<D>(dir: Arc<D>, audit: Arc<dyn AuditRepository>) -> Self
    where
        D: UserStore + RoleStore + 'static,
    {
        let users: Arc<dyn UserStore> = dir.clone();
        let roles: Arc<dyn RoleStore> = dir;
        Self { users, roles, audit }
    }
}

/// Build services from configuration.
///
/// `DATABASE_URL` selects Postgres (schema applied on start, audit log in the
/// same database), otherwise an in-memory directory and audit log.
/// `REDIS_URL` selects Redis, otherwise an in-memory cache.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let backends = match config.database_url.as_deref() {
        Some(url) => {
            let dir = PostgresDirectory::connect(url)
                .await
                .context("connecting to Postgres")?;
            dir.migrate().await.context("applying schema")?;
            info!("using Postgres directory");
            let audit = Arc::new(PostgresAuditLog::new(dir.pool()));
            Backends::from_directory(Arc::new(dir), audit)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory directory");
            Backends::from_directory(Arc::new(InMemoryDirectory::new()), Arc::new(InMemoryAuditLog::new()))
        }
    };

    let cache = build_cache(config).await?;
    AppServices::assemble(backends, cache, config)
}

async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheClient>> {
    match config.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = RedisCache::connect(url).await.context("connecting to Redis")?;
            info!("using Redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL set but the redis feature is disabled, using in-memory cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
        None => {
            warn!("REDIS_URL not set, using in-memory cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
    }
}
