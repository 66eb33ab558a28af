use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::validate::{self, MAX_ROLE_NAME_LENGTH, MIN_ROLE_NAME_LENGTH};
use gatehouse_core::{DomainResult, Entity, RoleId};

use crate::Permission;

/// Name of the role that bypasses every permission check.
pub const ROOT_ROLE: &str = "ROOT";

/// A named, toggleable bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        permissions: Vec<Permission>,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let role = Self {
            id: RoleId::new(),
            name: name.into(),
            permissions: dedup(permissions),
            enabled,
            created_at: now,
            updated_at: now,
        };
        role.validate()?;
        Ok(role)
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate::length("name", &self.name, MIN_ROLE_NAME_LENGTH, MAX_ROLE_NAME_LENGTH)
    }

    /// Replace the mutable fields in one step and re-validate.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        permissions: Vec<Permission>,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.name = name.into();
        self.permissions = dedup(permissions);
        self.enabled = enabled;
        self.updated_at = now;
        self.validate()
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_ROLE
    }

    pub fn has_wildcard(&self) -> bool {
        self.permissions.iter().any(Permission::is_wildcard)
    }

    pub fn has_permission(&self, required: &Permission) -> bool {
        self.permissions.iter().any(|p| p == required)
    }

    /// Whether this role alone admits `required`. Disabled roles admit nothing.
    pub fn grants(&self, required: &Permission) -> bool {
        self.enabled && (self.is_root() || self.has_wildcard() || self.has_permission(required))
    }
}

impl Entity for Role {
    type Id = RoleId;
    const KIND: &'static str = "role";

    fn id(&self) -> &RoleId {
        &self.id
    }
}

fn dedup(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort();
    permissions.dedup();
    permissions
}
