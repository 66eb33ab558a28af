use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};

use gatehouse_auth::permissions;
use gatehouse_core::UserId;
use gatehouse_infra::services::{NewUser, UserPatch};
use gatehouse_infra::store::UserFilter;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

/// Routes behind the access credential. `PUT /pass` is public and mounted
/// separately.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user).delete(delete_users))
        .route("/pass", delete(reset_password))
        .route("/:id", put(update_user))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListUsersQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::USERS_VIEW) {
        return resp;
    }
    let filter: UserFilter = query.into();
    match services.bounded(services.users.list(&filter)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::USERS_CREATE) {
        return resp;
    }
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.users.create(&audit, body)).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UserPatch>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::USERS_EDIT) {
        return resp;
    }
    let Ok(id) = id.parse::<UserId>() else {
        return errors::invalid_id(&id);
    };
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.users.update(&audit, id, body)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<dto::DeleteRequest<UserId>>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::USERS_DELETE) {
        return resp;
    }
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.users.delete(&audit, &body.ids)).await {
        Ok(deleted) => (StatusCode::OK, Json(serde_json::json!({ "deleted": deleted }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /v1/users/pass - first password for a "new" user (no credential needed)
pub async fn set_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SetPasswordRequest>,
) -> axum::response::Response {
    let result = services
        .bounded(
            services
                .users
                .set_password(&body.email, &body.password, &body.confirm_password),
        )
        .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// DELETE /v1/users/pass - return a user to the "new" state
pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ResetPasswordRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::USERS_EDIT) {
        return resp;
    }
    match services.bounded(services.users.reset_password(&body.email)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
