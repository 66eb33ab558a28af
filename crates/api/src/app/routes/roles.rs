use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use gatehouse_auth::permissions;
use gatehouse_core::RoleId;
use gatehouse_infra::services::{NewRole, RolePatch};
use gatehouse_infra::store::RoleFilter;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role).delete(delete_roles))
        .route("/list", get(list_role_items))
        .route("/:id", get(get_role).put(update_role))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListRolesQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_VIEW) {
        return resp;
    }
    let filter: RoleFilter = query.into();
    match services.bounded(services.roles.list(&filter)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /v1/roles/list - `id` + `name` pairs for selectors
pub async fn list_role_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_VIEW) {
        return resp;
    }
    match services.bounded(services.roles.list_items()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_VIEW) {
        return resp;
    }
    let Ok(id) = id.parse::<RoleId>() else {
        return errors::invalid_id(&id);
    };
    match services.bounded(services.roles.get(id)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<NewRole>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_CREATE) {
        return resp;
    }
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.roles.create(&audit, body)).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RolePatch>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_EDIT) {
        return resp;
    }
    let Ok(id) = id.parse::<RoleId>() else {
        return errors::invalid_id(&id);
    };
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.roles.update(&audit, id, body)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<dto::DeleteRequest<RoleId>>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, &permissions::ROLES_DELETE) {
        return resp;
    }
    let audit = principal.audit(&headers, peer.map(|ConnectInfo(addr)| addr));
    match services.bounded(services.roles.delete(&audit, &body.ids)).await {
        Ok(deleted) => (StatusCode::OK, Json(serde_json::json!({ "deleted": deleted }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
