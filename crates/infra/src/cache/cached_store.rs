//! Cache-through decorators for the user and role stores.
//!
//! Reads try `{kind}:{dimension}:{value}` first and fall back to the inner
//! store, populating on a hit there. Writes go to the inner store first and
//! only on success delete every key the affected record could be found under,
//! for both its previous and its new state. A populate racing such a write
//! never survives it (see [`ReadThrough::begin`]).

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use gatehouse_auth::{Role, User};
use gatehouse_core::{Entity, RoleId, UserId};

use super::{ReadThrough, key};
use crate::store::{Page, RoleFilter, RoleStore, StoreError, UserFilter, UserStore};

async fn read_through<T, F>(cache: &ReadThrough, key: String, load: F) -> Result<Option<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: Future<Output = Result<Option<T>, StoreError>> + Send,
{
    if let Some(hit) = cache.get::<T>(&key).await {
        return Ok(Some(hit));
    }
    let ticket = cache.begin(key);
    let found = load.await?;
    if let Some(record) = &found {
        cache.populate(ticket, record).await;
    }
    Ok(found)
}

fn user_keys(user: &User) -> Vec<String> {
    let mut keys = vec![
        key(User::KIND, "id", user.id),
        key(User::KIND, "username", &user.username),
        key(User::KIND, "email", &user.email),
    ];
    if let Some(token) = user.session_token() {
        keys.push(key(User::KIND, "token", token));
    }
    keys
}

fn role_keys(role: &Role) -> Vec<String> {
    vec![key(Role::KIND, "id", role.id), key(Role::KIND, "name", &role.name)]
}

fn merge(mut keys: Vec<String>) -> Vec<String> {
    keys.sort();
    keys.dedup();
    keys
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// [`UserStore`] decorator adding read-through caching.
///
/// Cached users embed a snapshot of their roles. With a role store attached
/// (see [`with_roles`](Self::with_roles)) every cache hit has its roles
/// re-resolved, so role edits and deletions apply at once; without one they
/// reach cached users when the entries expire.
pub struct CachedUserStore<S> {
    inner: S,
    cache: ReadThrough,
    roles: Option<Arc<dyn RoleStore>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for CachedUserStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedUserStore")
            .field("inner", &self.inner)
            .field("cache", &self.cache)
            .field("resolves_roles", &self.roles.is_some())
            .finish()
    }
}

impl<S> CachedUserStore<S> {
    pub fn new(inner: S, cache: ReadThrough) -> Self {
        Self { inner, cache, roles: None }
    }

    /// Resolve the roles of cache hits through `roles`, typically the
    /// [`CachedRoleStore`] sharing this cache.
    pub fn with_roles(mut self, roles: Arc<dyn RoleStore>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: UserStore> CachedUserStore<S> {
    async fn lookup<F>(&self, key: String, load: F) -> Result<Option<User>, StoreError>
    where
        F: Future<Output = Result<Option<User>, StoreError>> + Send,
    {
        let Some(roles) = &self.roles else {
            return read_through(&self.cache, key, load).await;
        };
        if let Some(mut hit) = self.cache.get::<User>(&key).await {
            let mut current = Vec::with_capacity(hit.roles.len());
            for role in &hit.roles {
                if let Some(role) = roles.find_by_id(role.id).await? {
                    current.push(role);
                }
            }
            hit.roles = current;
            return Ok(Some(hit));
        }
        read_through(&self.cache, key, load).await
    }
}

#[async_trait::async_trait]
impl<S: UserStore> UserStore for CachedUserStore<S> {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.lookup(key(User::KIND, "id", id), self.inner.find_by_id(id)).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let k = key(User::KIND, "username", username);
        self.lookup(k, self.inner.find_by_username(username)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let k = key(User::KIND, "email", email);
        self.lookup(k, self.inner.find_by_email(email)).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let k = key(User::KIND, "token", token);
        self.lookup(k, self.inner.find_by_token(token)).await
    }

    async fn list(&self, filter: &UserFilter) -> Result<Page<User>, StoreError> {
        self.inner.list(filter).await
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        self.inner.create(user).await?;
        self.cache.invalidate(user_keys(user)).await;
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let previous = self.inner.find_by_id(user.id).await?;
        self.inner.update(user).await?;

        let mut keys = user_keys(user);
        if let Some(previous) = &previous {
            keys.extend(user_keys(previous));
        }
        self.cache.invalidate(merge(keys)).await;
        Ok(())
    }

    async fn delete(&self, ids: &[UserId]) -> Result<u64, StoreError> {
        let mut keys: Vec<String> = ids.iter().map(|id| key(User::KIND, "id", id)).collect();
        for id in ids {
            if let Some(previous) = self.inner.find_by_id(*id).await? {
                keys.extend(user_keys(&previous));
            }
        }
        let removed = self.inner.delete(ids).await?;
        self.cache.invalidate(merge(keys)).await;
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// [`RoleStore`] decorator adding read-through caching.
#[derive(Debug)]
pub struct CachedRoleStore<S> {
    inner: S,
    cache: ReadThrough,
}

impl<S> CachedRoleStore<S> {
    pub fn new(inner: S, cache: ReadThrough) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<S: RoleStore> RoleStore for CachedRoleStore<S> {
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        read_through(&self.cache, key(Role::KIND, "id", id), self.inner.find_by_id(id)).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let k = key(Role::KIND, "name", name);
        read_through(&self.cache, k, self.inner.find_by_name(name)).await
    }

    async fn find_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        self.inner.find_by_ids(ids).await
    }

    async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, StoreError> {
        self.inner.list(filter).await
    }

    async fn create(&self, role: &Role) -> Result<(), StoreError> {
        self.inner.create(role).await?;
        self.cache.invalidate(role_keys(role)).await;
        Ok(())
    }

    async fn update(&self, role: &Role) -> Result<(), StoreError> {
        let previous = self.inner.find_by_id(role.id).await?;
        self.inner.update(role).await?;

        let mut keys = role_keys(role);
        if let Some(previous) = &previous {
            keys.extend(role_keys(previous));
        }
        self.cache.invalidate(merge(keys)).await;
        Ok(())
    }

    async fn delete(&self, ids: &[RoleId]) -> Result<u64, StoreError> {
        let mut keys: Vec<String> = ids.iter().map(|id| key(Role::KIND, "id", id)).collect();
        for role in self.inner.find_by_ids(ids).await? {
            keys.extend(role_keys(&role));
        }
        let removed = self.inner.delete(ids).await?;
        self.cache.invalidate(merge(keys)).await;
        Ok(removed)
    }
}
