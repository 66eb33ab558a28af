use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use gatehouse_auth::KeyClass;

use crate::app::services::AppServices;
use crate::middleware::{self, AuthState};

pub mod auth;
pub mod roles;
pub mod system;
pub mod users;

/// Versioned API routes.
///
/// One path may mix guards per method: `/v1/auth` takes no credential for
/// `POST`/`DELETE`, an access credential for `GET` and a refresh credential
/// for `PUT`.
pub fn router(services: Arc<AppServices>) -> Router {
    let public = Router::new()
        .route("/v1/auth", post(auth::login).delete(auth::logout))
        .route("/v1/users/pass", put(users::set_password));

    let access = Router::new()
        .route("/v1/auth", get(auth::me))
        .nest("/v1/users", users::router())
        .nest("/v1/roles", roles::router())
        .route_layer(axum::middleware::from_fn_with_state(
            AuthState::new(services.clone(), KeyClass::Access),
            middleware::authenticate,
        ));

    let refresh = Router::new()
        .route("/v1/auth", put(auth::refresh))
        .route_layer(axum::middleware::from_fn_with_state(
            AuthState::new(services, KeyClass::Refresh),
            middleware::authenticate,
        ));

    public.merge(access).merge(refresh)
}
