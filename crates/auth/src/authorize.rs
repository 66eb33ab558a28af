use serde::Serialize;
use thiserror::Error;

use gatehouse_core::UserId;

use crate::{Permission, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Reject a request that carries no resolved principal.
pub fn require_authenticated(principal: Option<&User>) -> Result<&User, AuthzError> {
    principal.ok_or(AuthzError::Unauthenticated)
}

/// Decide whether `principal` may perform an action guarded by `required`.
///
/// - No IO
/// - No panics
/// - Admits when any *enabled* role is root, carries `"*"`, or carries
///   `required` exactly; disabled roles contribute nothing.
pub fn authorize(principal: &User, required: &Permission) -> Result<(), AuthzError> {
    if principal.roles.iter().any(|role| role.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// `require_authenticated` followed by `authorize`.
pub fn authorize_request(principal: Option<&User>, required: &Permission) -> Result<(), AuthzError> {
    authorize(require_authenticated(principal)?, required)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permission that was being checked.
    pub required_permission: String,

    /// Whether the authorization was granted.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// The first enabled role that admitted the request.
    pub deciding_role: Option<String>,

    /// Assigned roles ignored because they are disabled.
    pub skipped_roles: Vec<String>,

    /// Details about the principal's state.
    pub principal: PrincipalState,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub username: String,
    pub roles: Vec<RoleState>,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleState {
    pub name: String,
    pub enabled: bool,
    pub root: bool,
    pub wildcard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingPermission,
    /// The permission exists on an assigned role, but that role is disabled.
    RoleDisabled,
}

/// Explain why `authorize` would allow or deny this request.
///
/// The decision always agrees with [`authorize`].
pub fn explain(principal: &User, required: &Permission) -> AuthorizationExplanation {
    let required_str = required.as_str();
    let state = PrincipalState {
        user_id: principal.id,
        username: principal.username.clone(),
        roles: principal
            .roles
            .iter()
            .map(|r| RoleState {
                name: r.name.clone(),
                enabled: r.enabled,
                root: r.is_root(),
                wildcard: r.has_wildcard(),
            })
            .collect(),
        effective_permissions: principal.effective_permissions(),
    };
    let skipped_roles: Vec<String> = principal
        .roles
        .iter()
        .filter(|r| !r.enabled)
        .map(|r| r.name.clone())
        .collect();

    if let Some(role) = principal.roles.iter().find(|r| r.grants(required)) {
        let reason = if role.is_root() {
            format!("Role '{}' is the root role", role.name)
        } else if role.has_wildcard() {
            format!("Role '{}' carries the wildcard permission '*'", role.name)
        } else {
            format!("Role '{}' grants '{}'", role.name, required_str)
        };
        return AuthorizationExplanation {
            required_permission: required_str.to_string(),
            granted: true,
            reason,
            deciding_role: Some(role.name.clone()),
            skipped_roles,
            principal: state,
            denial_reason: None,
        };
    }

    let disabled_granting: Vec<String> = principal
        .roles
        .iter()
        .filter(|r| !r.enabled && (r.is_root() || r.has_wildcard() || r.has_permission(required)))
        .map(|r| r.name.clone())
        .collect();

    let denial = if disabled_granting.is_empty() {
        DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission: '{required_str}'"),
            suggestions: vec![format!("Assign a role that grants the '{required_str}' permission")],
        }
    } else {
        DenialReason {
            kind: DenialKind::RoleDisabled,
            message: format!("Only disabled roles grant '{required_str}'"),
            suggestions: vec![format!("Enable one of the roles {disabled_granting:?}")],
        }
    };

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted: false,
        reason: format!(
            "Principal does not have permission '{}'. Current permissions: {:?}",
            required_str, state.effective_permissions
        ),
        deciding_role: None,
        skipped_roles,
        principal: state,
        denial_reason: Some(denial),
    }
}
