//! Output projections returned by the use cases.

use serde::{Deserialize, Serialize};

use gatehouse_auth::{Role, User};
use gatehouse_core::{RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleView {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<String>,
    pub enabled: bool,
}

impl From<&Role> for RoleView {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            permissions: role.permissions.iter().map(|p| p.as_str().to_string()).collect(),
            enabled: role.enabled,
        }
    }
}

/// Selector entry (`id` + `name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: RoleId,
    pub name: String,
}

impl From<&Role> for ItemView {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: String,
    pub status: bool,
    /// No password chosen yet.
    pub new: bool,
    pub roles: Vec<RoleView>,
    /// Sorted union over enabled roles.
    pub permissions: Vec<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            status: user.credential.status,
            new: user.is_new(),
            roles: user.roles.iter().map(RoleView::from).collect(),
            permissions: user.effective_permissions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutput {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gatehouse_auth::testutil;

    use super::*;

    #[test]
    fn user_view_never_exposes_secrets() {
        let mut user = testutil::active_user("viewme", "s3cret!");
        user.credential.set_token("ref-xyz", Utc::now());
        user.add_role(testutil::role("admins", &["*"]));

        let json = serde_json::to_string(&UserView::from(&user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("ref-xyz"));
        assert!(json.contains("\"permissions\":[\"*\"]"));
    }
}
