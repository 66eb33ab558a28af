use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use gatehouse_auth::{Permission, Role};
use gatehouse_core::RoleId;

use crate::audit::{AuditAction, AuditContext, AuditEntry, Auditor};
use crate::error::{ServiceError, ServiceResult};
use crate::services::views::{ItemView, RoleView};
use crate::store::{Page, Pagination, RoleFilter, RoleStore};

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Defaults to enabled.
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    audit: Auditor,
}

impl std::fmt::Debug for RoleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleService").finish_non_exhaustive()
    }
}

fn parse_permissions(raw: &[String]) -> ServiceResult<Vec<Permission>> {
    raw.iter()
        .map(|p| {
            let p = p.trim();
            if p.is_empty() || p.contains(char::is_whitespace) {
                Err(ServiceError::validation(format!("invalid permission '{p}'")))
            } else {
                Ok(Permission::from(p))
            }
        })
        .collect()
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleStore>, audit: Auditor) -> Self {
        Self { roles, audit }
    }

    pub async fn list(&self, filter: &RoleFilter) -> ServiceResult<Page<RoleView>> {
        Ok(self.roles.list(filter).await?.map(|r| RoleView::from(&r)))
    }

    /// Every role as `id` + `name`, sorted by name.
    pub async fn list_items(&self) -> ServiceResult<Vec<ItemView>> {
        let all = RoleFilter {
            pagination: Pagination::default(),
            ..Default::default()
        };
        Ok(self.roles.list(&all).await?.items.iter().map(ItemView::from).collect())
    }

    pub async fn get(&self, id: RoleId) -> ServiceResult<RoleView> {
        Ok(RoleView::from(&self.load(id).await?))
    }

    #[instrument(skip(self, context), err)]
    pub async fn create(&self, context: &AuditContext, input: NewRole) -> ServiceResult<RoleView> {
        let role = Role::new(
            input.name.trim(),
            parse_permissions(&input.permissions)?,
            input.enabled.unwrap_or(true),
            Utc::now(),
        )?;
        self.ensure_unique(&role).await?;
        self.roles.create(&role).await?;
        info!(role_id = %role.id, "role created");
        self.audit.record(AuditEntry::new(
            context,
            AuditAction::Create,
            "role",
            role.id.to_string(),
            json!({
                "input": {
                    "name": input.name,
                    "permissions": input.permissions,
                    "enabled": input.enabled,
                }
            }),
        ));
        Ok(RoleView::from(&role))
    }

    #[instrument(skip(self, context), err)]
    pub async fn update(&self, context: &AuditContext, id: RoleId, patch: RolePatch) -> ServiceResult<RoleView> {
        let mut role = self.load(id).await?;
        let name = patch.name.as_deref().map(str::trim).unwrap_or(&role.name).to_string();
        let permissions = match &patch.permissions {
            Some(raw) => parse_permissions(raw)?,
            None => role.permissions.clone(),
        };
        let enabled = patch.enabled.unwrap_or(role.enabled);

        role.update(name, permissions, enabled, Utc::now())?;
        self.ensure_unique(&role).await?;
        self.roles.update(&role).await?;
        info!(role_id = %role.id, "role updated");
        self.audit.record(AuditEntry::new(
            context,
            AuditAction::Update,
            "role",
            role.id.to_string(),
            json!({
                "input": {
                    "name": patch.name,
                    "permissions": patch.permissions,
                    "enabled": patch.enabled,
                }
            }),
        ));
        Ok(RoleView::from(&role))
    }

    /// All-or-nothing; `Conflict` while any role is still assigned.
    #[instrument(skip(self, context), err)]
    pub async fn delete(&self, context: &AuditContext, ids: &[RoleId]) -> ServiceResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.roles.delete(ids).await?;
        info!(removed, "roles deleted");
        for id in ids {
            self.audit.record(AuditEntry::new(
                context,
                AuditAction::Delete,
                "role",
                id.to_string(),
                json!({}),
            ));
        }
        Ok(removed)
    }

    async fn load(&self, id: RoleId) -> ServiceResult<Role> {
        self.roles
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("role"))
    }

    async fn ensure_unique(&self, role: &Role) -> ServiceResult<()> {
        match self.roles.find_by_name(&role.name).await? {
            Some(other) if other.id != role.id => {
                Err(ServiceError::Conflict("role name already exists".into()))
            }
            _ => Ok(()),
        }
    }
}
