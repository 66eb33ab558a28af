//! Authoritative storage ports for users and roles.
//!
//! Stores are the single source of truth. Every adapter must:
//! - enforce uniqueness of username, email, session token and role name (`Conflict`)
//! - refuse to delete a role that is still assigned to a user (`Conflict`)
//! - cascade a user delete to its credential and role assignments
//! - apply multi-table writes atomically

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_auth::{Role, User};
use gatehouse_core::{RoleId, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────────────────────────

/// 1-based page request. `limit == 0` returns every matching record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 0 }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(0).min(1000),
        }
    }

    pub fn offset(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
        }
    }

    /// Slice an already filtered and sorted result set.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = if self.limit == 0 {
            items
        } else {
            items
                .into_iter()
                .skip(self.offset() as usize)
                .take(self.limit as usize)
                .collect()
        };
        Page::new(items, *self, total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        let total_pages = match (pagination.limit, total_items) {
            (_, 0) => 0,
            (0, _) => 1,
            (limit, total) => total.div_ceil(u64::from(limit)) as u32,
        };
        Self {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total_items,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    /// Case-insensitive substring over name, username and email.
    pub search: Option<String>,
    pub status: Option<bool>,
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(status) = self.status {
            if user.credential.status != status {
                return false;
            }
        }
        if let Some(role_id) = self.role_id {
            if !user.roles.iter().any(|r| r.id == role_id) {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                [&user.name, &user.username, &user.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFilter {
    /// Case-insensitive substring over the role name.
    pub search: Option<String>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        if let Some(enabled) = self.enabled {
            if role.enabled != enabled {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                role.name.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

/// Users with their credential and resolved roles.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Lookup by session-token reference.
    async fn find_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Sorted by name.
    async fn list(&self, filter: &UserFilter) -> Result<Page<User>, StoreError>;

    /// Persist user, credential and role assignments together.
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    /// Replace user, credential and role assignments. `NotFound` when absent.
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Returns the number of users removed; unknown ids are ignored.
    async fn delete(&self, ids: &[UserId]) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;
    /// Every role among `ids` that exists; missing ids are skipped.
    async fn find_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError>;
    /// Sorted by name.
    async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, StoreError>;

    async fn create(&self, role: &Role) -> Result<(), StoreError>;
    async fn update(&self, role: &Role) -> Result<(), StoreError>;
    /// All-or-nothing: `Conflict` if any role is still assigned.
    async fn delete(&self, ids: &[RoleId]) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_token(token).await
    }

    async fn list(&self, filter: &UserFilter) -> Result<Page<User>, StoreError> {
        (**self).list(filter).await
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        (**self).create(user).await
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        (**self).update(user).await
    }

    async fn delete(&self, ids: &[UserId]) -> Result<u64, StoreError> {
        (**self).delete(ids).await
    }
}

#[async_trait::async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn find_by_id(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        (**self).find_by_name(name).await
    }

    async fn find_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        (**self).find_by_ids(ids).await
    }

    async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, StoreError> {
        (**self).list(filter).await
    }

    async fn create(&self, role: &Role) -> Result<(), StoreError> {
        (**self).create(role).await
    }

    async fn update(&self, role: &Role) -> Result<(), StoreError> {
        (**self).update(role).await
    }

    async fn delete(&self, ids: &[RoleId]) -> Result<u64, StoreError> {
        (**self).delete(ids).await
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn pagination_slices_and_counts_pages() {
        let page = Pagination::new(Some(2), Some(2)).apply((1..=5).collect::<Vec<_>>());
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.total_items, 5);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn zero_limit_is_unpaginated() {
        let page = Pagination::new(None, None).apply(vec!['a', 'b', 'c']);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn empty_result_has_no_pages() {
        let page = Pagination::new(Some(1), Some(10)).apply(Vec::<u8>::new());
        assert_eq!(page.total_pages, 0);
    }

    proptest! {
        #[test]
        fn pages_partition_the_result_set(len in 0usize..200, limit in 1u32..40) {
            let items: Vec<usize> = (0..len).collect();
            let first = Pagination::new(Some(1), Some(limit)).apply(items.clone());

            let mut seen = Vec::new();
            for page in 1..=first.total_pages {
                let slice = Pagination::new(Some(page), Some(limit)).apply(items.clone());
                prop_assert!(!slice.items.is_empty());
                prop_assert!(slice.items.len() <= limit as usize);
                prop_assert_eq!(slice.total_items, len as u64);
                seen.extend(slice.items);
            }
            prop_assert_eq!(seen, items.clone());

            let beyond = Pagination::new(Some(first.total_pages + 1), Some(limit)).apply(items);
            prop_assert!(beyond.items.is_empty());
        }
    }
}
