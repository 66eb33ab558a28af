#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gatehouse_auth::{User, testutil};
use gatehouse_infra::Deadline;
use gatehouse_infra::audit::{Auditor, InMemoryAuditLog};
use gatehouse_infra::cache::{CacheConfig, CachedRoleStore, CachedUserStore, InMemoryCache, ReadThrough};
use gatehouse_infra::revocation::{CacheRevocationRegistry, RevocationRegistry};
use gatehouse_infra::services::{RoleService, SessionService, UserService};
use gatehouse_infra::store::{InMemoryDirectory, RoleStore, UserStore};

pub struct World {
    pub dir: Arc<InMemoryDirectory>,
    pub cache: Arc<InMemoryCache>,
    pub audit: Arc<InMemoryAuditLog>,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub session: SessionService,
    pub user_service: UserService,
    pub role_service: RoleService,
}

/// Cache populates inline, so cache contents are deterministic.
pub fn world() -> World {
    build(CacheConfig::default().detached(false), None)
}

/// Production cache policy: populates run on their own tasks.
pub fn world_detached() -> World {
    build(CacheConfig::default(), None)
}

pub fn world_with_registry(registry: Option<Arc<dyn RevocationRegistry>>) -> World {
    build(CacheConfig::default().detached(false), registry)
}

fn build(config: CacheConfig, registry: Option<Arc<dyn RevocationRegistry>>) -> World {
    let dir = Arc::new(InMemoryDirectory::new());
    let cache = Arc::new(InMemoryCache::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let rt = ReadThrough::new(cache.clone(), config);

    let roles: Arc<dyn RoleStore> = Arc::new(CachedRoleStore::new(dir.clone(), rt.clone()));
    let users: Arc<dyn UserStore> =
        Arc::new(CachedUserStore::new(dir.clone(), rt).with_roles(roles.clone()));
    let revocations = registry
        .unwrap_or_else(|| Arc::new(CacheRevocationRegistry::new(cache.clone())));
    let tokens = Arc::new(testutil::token_service());
    let auditor = Auditor::new(audit.clone());

    World {
        session: SessionService::new(users.clone(), revocations, tokens),
        user_service: UserService::new(users.clone(), roles.clone(), auditor.clone()),
        role_service: RoleService::new(roles.clone(), auditor),
        dir,
        cache,
        audit,
        users,
        roles,
    }
}

/// Let spawned cache and audit writes run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

/// Active user holding one enabled role with `permissions`.
pub async fn seed_user(world: &World, username: &str, password: &str, permissions: &[&str]) -> User {
    let role = testutil::role(&format!("{username}-role"), permissions);
    world.roles.create(&role).await.unwrap();
    let mut user = testutil::active_user(username, password);
    user.add_role(role);
    world.users.create(&user).await.unwrap();
    user
}
