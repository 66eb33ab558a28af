use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use gatehouse_infra::services::LoginInput;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;
use crate::middleware::extract_bearer;

/// POST /v1/auth - exchange login and password for an envelope pair
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginInput>,
) -> axum::response::Response {
    match services.session.login(&body, services.deadline()).await {
        Ok(out) => (StatusCode::OK, Json(out)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /v1/auth - the authenticated user with effective permissions
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.session.me(principal.user_id(), services.deadline()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /v1/auth - re-issue both envelopes from a refresh credential
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::RefreshQuery>,
) -> axum::response::Response {
    let expiration = query.expiration.unwrap_or(true);
    match services
        .session
        .refresh(principal.user_id(), expiration, services.deadline())
        .await
    {
        Ok(out) => (StatusCode::OK, Json(out)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// DELETE /v1/auth - revoke the session behind an access or refresh credential
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let raw = match extract_bearer(&headers) {
        Ok(raw) => raw,
        Err(e) => return errors::service_error_to_response(e),
    };
    match services.session.logout(raw, services.deadline()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
