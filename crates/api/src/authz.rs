//! API-side permission guard.
//!
//! Runs in handlers after the authentication middleware has resolved the
//! principal, before any use case is invoked.

use axum::response::Response;
use tracing::warn;

use gatehouse_auth::{Permission, authorize_request, explain};
use gatehouse_infra::ServiceError;

use crate::app::errors;
use crate::context::PrincipalContext;

/// Admit the request when an enabled role of the principal grants `required`.
///
/// Denials are logged with the evaluator's explanation.
pub fn require(principal: &PrincipalContext, required: &Permission) -> Result<(), Response> {
    authorize_request(Some(principal.user()), required).map_err(|err| {
        let explanation = explain(principal.user(), required);
        warn!(
            user_id = %principal.user_id(),
            permission = %required,
            reason = %explanation.reason,
            skipped_roles = ?explanation.skipped_roles,
            "request denied"
        );
        errors::service_error_to_response(ServiceError::from(err))
    })
}
