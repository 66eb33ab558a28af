use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use gatehouse_auth::{Role, User};
use gatehouse_core::{RoleId, UserId};

use super::{Page, RoleFilter, RoleStore, StoreError, UserFilter, UserStore};

/// A user row as stored: role assignments are ids, resolved on read.
#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    role_ids: Vec<RoleId>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRow>,
    roles: HashMap<RoleId, Role>,
}

impl Tables {
    fn resolve(&self, row: &UserRow) -> User {
        let mut user = row.user.clone();
        let mut roles: Vec<Role> = row
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        user.roles = roles;
        user
    }

    fn find_user(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .values()
            .find(|row| pred(&row.user))
            .map(|row| self.resolve(row))
    }

    fn check_user_unique(&self, user: &User) -> Result<(), StoreError> {
        for row in self.users.values().filter(|row| row.user.id != user.id) {
            let other = &row.user;
            if other.username == user.username {
                return Err(StoreError::Conflict("username already exists".into()));
            }
            if other.email == user.email {
                return Err(StoreError::Conflict("email already exists".into()));
            }
            if user.credential.token.is_some() && other.credential.token == user.credential.token {
                return Err(StoreError::Conflict("session token already exists".into()));
            }
        }
        Ok(())
    }

    fn check_role_refs(&self, role_ids: &[RoleId]) -> Result<(), StoreError> {
        match role_ids.iter().find(|id| !self.roles.contains_key(*id)) {
            Some(missing) => Err(StoreError::Conflict(format!("role {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn check_role_unique(&self, role: &Role) -> Result<(), StoreError> {
        if self
            .roles
            .values()
            .any(|other| other.id != role.id && other.name == role.name)
        {
            return Err(StoreError::Conflict("role name already exists".into()));
        }
        Ok(())
    }
}

fn to_row(user: &User) -> UserRow {
    let mut role_ids: Vec<RoleId> = user.roles.iter().map(|r| r.id).collect();
    role_ids.sort();
    role_ids.dedup();
    let mut stripped = user.clone();
    stripped.roles.clear();
    UserRow {
        user: stripped,
        role_ids,
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory users, credentials, roles and assignments under one lock.
///
/// Intended for tests/dev. Counts every read so callers can observe whether a
/// lookup reached the store or was served from a cache in front of it.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tables: RwLock<Tables>,
    reads: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read operations served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| poisoned())
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let tables = self.read()?;
        Ok(tables.users.get(&id).map(|row| tables.resolve(row)))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.find_user(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.find_user(|u| u.email == email))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .find_user(|u| u.credential.token.as_deref() == Some(token)))
    }

    async fn list(&self, filter: &UserFilter) -> Result<Page<User>, StoreError> {
        let tables = self.read()?;
        let mut users: Vec<User> = tables
            .users
            .values()
            .map(|row| tables.resolve(row))
            .filter(|u| filter.matches(u))
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(filter.pagination.apply(users))
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Conflict("user already exists".into()));
        }
        tables.check_user_unique(user)?;
        let row = to_row(user);
        tables.check_role_refs(&row.role_ids)?;
        tables.users.insert(user.id, row);
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        tables.check_user_unique(user)?;
        let row = to_row(user);
        tables.check_role_refs(&row.role_ids)?;
        tables.users.insert(user.id, row);
        Ok(())
    }

    async fn delete(&self, ids: &[UserId]) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        Ok(ids
            .iter()
            .filter(|id| tables.users.remove(*id).is_some())
            .count() as u64)
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryDirectory {
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.roles.values().find(|r| r.name == name).cloned())
    }

    async fn find_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let tables = self.read()?;
        let mut roles: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, StoreError> {
        let tables = self.read()?;
        let mut roles: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(filter.pagination.apply(roles))
    }

    async fn create(&self, role: &Role) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict("role already exists".into()));
        }
        tables.check_role_unique(role)?;
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update(&self, role: &Role) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.roles.contains_key(&role.id) {
            return Err(StoreError::NotFound);
        }
        tables.check_role_unique(role)?;
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn delete(&self, ids: &[RoleId]) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let referenced = tables
            .users
            .values()
            .any(|row| row.role_ids.iter().any(|id| ids.contains(id)));
        if referenced {
            return Err(StoreError::Conflict("role is still assigned to users".into()));
        }
        Ok(ids
            .iter()
            .filter(|id| tables.roles.remove(*id).is_some())
            .count() as u64)
    }
}
