use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use gatehouse_auth::KeyClass;
use gatehouse_infra::ServiceError;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Middleware state: which key class the guarded routes accept.
#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
    pub class: KeyClass,
}

impl AuthState {
    pub fn new(services: Arc<AppServices>, class: KeyClass) -> Self {
        Self { services, class }
    }
}

/// Verify the bearer credential for `state.class`, reject revoked sessions
/// and disabled users, then attach a [`PrincipalContext`].
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let raw = extract_bearer(req.headers())
        .map_err(errors::service_error_to_response)?
        .to_owned();

    let user = state
        .services
        .session
        .authenticate(&raw, state.class, state.services.deadline())
        .await
        .map_err(errors::service_error_to_response)?;

    req.extensions_mut().insert(PrincipalContext::new(user));
    Ok(next.run(req).await)
}

pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ServiceError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ServiceError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| ServiceError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(ServiceError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ServiceError::Unauthenticated);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_is_extracted_and_trimmed() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def ")).unwrap(), "abc.def");
    }

    #[test]
    fn missing_or_foreign_schemes_are_rejected() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(ServiceError::Unauthenticated));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(ServiceError::Unauthenticated));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(ServiceError::Unauthenticated));
    }
}
