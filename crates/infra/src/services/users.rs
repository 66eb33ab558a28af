use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use gatehouse_auth::{Credential, PasswordError, Role, User};
use gatehouse_core::{RoleId, UserId};

use crate::audit::{AuditAction, AuditContext, AuditEntry, Auditor};
use crate::error::{ServiceError, ServiceResult};
use crate::services::views::UserView;
use crate::store::{Page, RoleStore, UserFilter, UserStore};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    /// Defaults to enabled.
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

/// Absent fields are left unchanged; `role_ids` replaces the whole set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub status: Option<bool>,
    pub role_ids: Option<Vec<RoleId>>,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    audit: Auditor,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService").finish_non_exhaustive()
    }
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, roles: Arc<dyn RoleStore>, audit: Auditor) -> Self {
        Self { users, roles, audit }
    }

    pub async fn list(&self, filter: &UserFilter) -> ServiceResult<Page<UserView>> {
        Ok(self.users.list(filter).await?.map(|u| UserView::from(&u)))
    }

    pub async fn get(&self, id: UserId) -> ServiceResult<UserView> {
        Ok(UserView::from(&self.load(id).await?))
    }

    #[instrument(skip(self, context), err)]
    pub async fn create(&self, context: &AuditContext, input: NewUser) -> ServiceResult<UserView> {
        let now = Utc::now();
        let mut user = User::new(
            input.name.trim(),
            input.username.trim(),
            input.email.trim(),
            input.status.unwrap_or(true),
            now,
        )?;
        self.ensure_unique(&user).await?;
        user.set_roles(self.resolve_roles(&input.role_ids).await?, now);

        self.users.create(&user).await?;
        info!(user_id = %user.id, "user created");
        self.audit.record(AuditEntry::new(
            context,
            AuditAction::Create,
            "user",
            user.id.to_string(),
            json!({
                "input": {
                    "name": input.name,
                    "username": input.username,
                    "email": input.email,
                    "status": input.status,
                    "role_ids": input.role_ids,
                }
            }),
        ));
        Ok(UserView::from(&user))
    }

    #[instrument(skip(self, context), err)]
    pub async fn update(&self, context: &AuditContext, id: UserId, patch: UserPatch) -> ServiceResult<UserView> {
        let now = Utc::now();
        let mut user = self.load(id).await?;

        let name = patch.name.as_deref().map(str::trim).unwrap_or(&user.name).to_string();
        let username = patch.username.as_deref().map(str::trim).unwrap_or(&user.username).to_string();
        let email = patch.email.as_deref().map(str::trim).unwrap_or(&user.email).to_string();
        user.update_profile(name, username, email, now)?;
        self.ensure_unique(&user).await?;

        if let Some(status) = patch.status {
            user.credential.set_status(status, now);
        }
        if let Some(role_ids) = &patch.role_ids {
            user.set_roles(self.resolve_roles(role_ids).await?, now);
        }

        self.users.update(&user).await?;
        info!(user_id = %user.id, "user updated");
        self.audit.record(AuditEntry::new(
            context,
            AuditAction::Update,
            "user",
            user.id.to_string(),
            json!({
                "input": {
                    "name": patch.name,
                    "username": patch.username,
                    "email": patch.email,
                    "status": patch.status,
                    "role_ids": patch.role_ids,
                }
            }),
        ));
        Ok(UserView::from(&user))
    }

    /// Removes users together with their credentials. Empty input is a no-op.
    #[instrument(skip(self, context), err)]
    pub async fn delete(&self, context: &AuditContext, ids: &[UserId]) -> ServiceResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.users.delete(ids).await?;
        info!(removed, "users deleted");
        for id in ids {
            self.audit.record(AuditEntry::new(
                context,
                AuditAction::Delete,
                "user",
                id.to_string(),
                json!({}),
            ));
        }
        Ok(removed)
    }

    /// First password for a new user, looked up by email.
    #[instrument(skip(self, password, confirm), err)]
    pub async fn set_password(&self, email: &str, password: &str, confirm: &str) -> ServiceResult<()> {
        if password != confirm {
            return Err(ServiceError::validation("passwords do not match"));
        }
        gatehouse_auth::password::check_policy(password)?;

        let mut user = self
            .users
            .find_by_email(email.trim())
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if user.credential.has_password() {
            return Err(ServiceError::Conflict("password already set".into()));
        }

        let now = Utc::now();
        user.credential = hash_into(user.credential, password.to_string()).await?;
        user.credential.set_token(Uuid::new_v4().to_string(), now);
        self.users.update(&user).await?;
        info!(user_id = %user.id, "password set");
        Ok(())
    }

    /// Clear password and session reference. Unknown emails are accepted silently.
    #[instrument(skip(self), err)]
    pub async fn reset_password(&self, email: &str) -> ServiceResult<()> {
        let Some(mut user) = self.users.find_by_email(email.trim()).await? else {
            return Ok(());
        };
        user.credential.reset(Utc::now());
        self.users.update(&user).await?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    async fn load(&self, id: UserId) -> ServiceResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    async fn ensure_unique(&self, user: &User) -> ServiceResult<()> {
        if let Some(other) = self.users.find_by_username(&user.username).await? {
            if other.id != user.id {
                return Err(ServiceError::Conflict("username already exists".into()));
            }
        }
        if let Some(other) = self.users.find_by_email(&user.email).await? {
            if other.id != user.id {
                return Err(ServiceError::Conflict("email already exists".into()));
            }
        }
        Ok(())
    }

    async fn resolve_roles(&self, ids: &[RoleId]) -> ServiceResult<Vec<Role>> {
        let mut wanted = ids.to_vec();
        wanted.sort();
        wanted.dedup();
        let roles = self.roles.find_by_ids(&wanted).await?;
        if roles.len() != wanted.len() {
            return Err(ServiceError::validation("role not found"));
        }
        Ok(roles)
    }
}

/// Argon2 is CPU-heavy; keep it off the async workers.
async fn hash_into(mut credential: Credential, password: String) -> ServiceResult<Credential> {
    tokio::task::spawn_blocking(move || {
        credential.set_password(&password, Utc::now())?;
        Ok::<_, PasswordError>(credential)
    })
    .await
    .map_err(|e| ServiceError::internal(format!("password hashing task failed: {e}")))?
    .map_err(ServiceError::from)
}
