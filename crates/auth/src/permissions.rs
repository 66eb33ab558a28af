use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque `resource:action` strings (e.g. "users:view").
/// The wildcard `"*"` grants every permission to the role that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

pub const WILDCARD: &str = "*";

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in catalogue
// ─────────────────────────────────────────────────────────────────────────────

pub const USERS_VIEW: Permission = Permission::from_static("users:view");
pub const USERS_CREATE: Permission = Permission::from_static("users:create");
pub const USERS_EDIT: Permission = Permission::from_static("users:edit");
pub const USERS_DELETE: Permission = Permission::from_static("users:delete");

pub const ROLES_VIEW: Permission = Permission::from_static("roles:view");
pub const ROLES_CREATE: Permission = Permission::from_static("roles:create");
pub const ROLES_EDIT: Permission = Permission::from_static("roles:edit");
pub const ROLES_DELETE: Permission = Permission::from_static("roles:delete");

/// Every permission the HTTP surface checks, in display order.
pub fn catalogue() -> [Permission; 8] {
    [
        USERS_VIEW,
        USERS_CREATE,
        USERS_EDIT,
        USERS_DELETE,
        ROLES_VIEW,
        ROLES_CREATE,
        ROLES_EDIT,
        ROLES_DELETE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_recognised() {
        assert!(Permission::new("*").is_wildcard());
        assert!(!USERS_VIEW.is_wildcard());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ROLES_EDIT).unwrap();
        assert_eq!(json, "\"roles:edit\"");
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ROLES_EDIT);
    }
}
