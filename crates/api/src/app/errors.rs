use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use gatehouse_infra::ServiceError;

/// Map a use-case failure to a response.
///
/// Authentication and authorization failures carry a fixed message so they
/// cannot be used to enumerate accounts; internal detail only reaches logs.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Unauthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
        }
        ServiceError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", "permission denied"),
        ServiceError::InvalidCredentials => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid login or password",
        ),
        ServiceError::DisabledPrincipal => {
            json_error(StatusCode::FORBIDDEN, "disabled_principal", "account is disabled")
        }
        ServiceError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        ServiceError::Conflict(_) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            "resource already exists or is still referenced",
        ),
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::Internal(detail) => {
            error!(%detail, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(raw: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("'{raw}' is not a valid identifier"))
}
