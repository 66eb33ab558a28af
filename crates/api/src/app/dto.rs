//! Request DTOs that do not map one-to-one onto use-case inputs.

use serde::Deserialize;

use gatehouse_core::RoleId;
use gatehouse_infra::store::{Pagination, RoleFilter, UserFilter};

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    /// `false` issues envelopes without an `exp` claim.
    pub expiration: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub status: Option<bool>,
    pub role_id: Option<RoleId>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ListUsersQuery> for UserFilter {
    fn from(q: ListUsersQuery) -> Self {
        Self {
            search: q.search,
            status: q.status,
            role_id: q.role_id,
            pagination: Pagination::new(q.page, q.limit),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRolesQuery {
    pub search: Option<String>,
    pub enabled: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ListRolesQuery> for RoleFilter {
    fn from(q: ListRolesQuery) -> Self {
        Self {
            search: q.search,
            enabled: q.enabled,
            pagination: Pagination::new(q.page, q.limit),
        }
    }
}

/// `DELETE` body for bulk removal.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest<Id> {
    pub ids: Vec<Id>,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl std::fmt::Debug for SetPasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetPasswordRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_to_first_unpaginated_page() {
        let filter = UserFilter::from(ListUsersQuery::default());
        assert_eq!(filter.pagination, Pagination { page: 1, limit: 0 });
        assert!(filter.search.is_none());
    }

    #[test]
    fn set_password_debug_hides_secrets() {
        let req = SetPasswordRequest {
            email: "ada@example.com".into(),
            password: "hunter22".into(),
            confirm_password: "hunter22".into(),
        };
        assert!(!format!("{req:?}").contains("hunter22"));
    }
}
