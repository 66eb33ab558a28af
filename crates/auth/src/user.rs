use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::validate::{
    self, MAX_NAME_LENGTH, MAX_USERNAME_LENGTH, MIN_NAME_LENGTH, MIN_USERNAME_LENGTH,
};
use gatehouse_core::{DomainResult, Entity, UserId};

use crate::{Credential, Role};

/// An authenticatable identity together with its resolved roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: String,
    pub credential: Credential,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        status: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let user = Self {
            id: UserId::new(),
            name: name.into(),
            username: username.into(),
            email: email.into(),
            credential: Credential::new(status, now),
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate::length("name", &self.name, MIN_NAME_LENGTH, MAX_NAME_LENGTH)?;
        validate::length("username", &self.username, MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH)?;
        validate::email(&self.email)
    }

    /// Replace the profile fields and re-validate.
    pub fn update_profile(
        &mut self,
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.name = name.into();
        self.username = username.into();
        self.email = email.into();
        self.updated_at = now;
        self.validate()
    }

    /// Attach a role; a role already present (by id) is ignored.
    pub fn add_role(&mut self, role: Role) {
        if !self.roles.iter().any(|r| r.id == role.id) {
            self.roles.push(role);
        }
    }

    pub fn set_roles(&mut self, roles: Vec<Role>, now: DateTime<Utc>) {
        self.roles.clear();
        for role in roles {
            self.add_role(role);
        }
        self.updated_at = now;
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    pub fn session_token(&self) -> Option<&str> {
        self.credential.token.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.credential.is_active()
    }

    pub fn is_new(&self) -> bool {
        self.credential.is_new()
    }

    /// Sorted union of the permissions carried by enabled roles.
    pub fn effective_permissions(&self) -> Vec<String> {
        self.roles
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|r| r.permissions.iter().map(|p| p.as_str().to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Entity for User {
    type Id = UserId;
    const KIND: &'static str = "user";

    fn id(&self) -> &UserId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{ROLES_VIEW, USERS_EDIT, USERS_VIEW};

    fn sample() -> User {
        User::new("Ada Lovelace", "ada.l", "ada@example.com", true, Utc::now()).unwrap()
    }

    #[test]
    fn validates_profile_fields() {
        let now = Utc::now();
        assert!(User::new("Ada", "ada.l", "ada@example.com", true, now).is_err());
        assert!(User::new("Ada Lovelace", "ada", "ada@example.com", true, now).is_err());
        assert!(User::new("Ada Lovelace", "ada.l", "not-an-email", true, now).is_err());
        assert!(User::new("Ada Lovelace", "ada.l", "", true, now).is_err());
    }

    #[test]
    fn new_user_has_no_password_yet() {
        let user = sample();
        assert!(user.is_new());
        assert!(!user.is_active());
        assert_eq!(user.session_token(), None);
    }

    #[test]
    fn add_role_ignores_duplicates() {
        let now = Utc::now();
        let role = Role::new("viewer", vec![USERS_VIEW], true, now).unwrap();
        let mut user = sample();
        user.add_role(role.clone());
        user.add_role(role);
        assert_eq!(user.roles.len(), 1);
        assert!(user.has_role("viewer"));
    }

    #[test]
    fn effective_permissions_skip_disabled_roles() {
        let now = Utc::now();
        let mut user = sample();
        user.set_roles(
            vec![
                Role::new("viewer", vec![USERS_VIEW, ROLES_VIEW], true, now).unwrap(),
                Role::new("editor", vec![USERS_EDIT], false, now).unwrap(),
                Role::new("auditor", vec![USERS_VIEW], true, now).unwrap(),
            ],
            now,
        );
        assert_eq!(user.effective_permissions(), vec!["roles:view", "users:view"]);
    }
}
