use std::net::SocketAddr;

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

use gatehouse_auth::User;
use gatehouse_core::UserId;
use gatehouse_infra::audit::AuditContext;

/// Principal context for a request (the active user resolved from the
/// bearer credential, roles included).
///
/// Inserted by the authentication middleware; absent on public routes.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    user: User,
}

impl PrincipalContext {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Audit context for a write made by this principal.
    ///
    /// The client address is the first `X-Forwarded-For` hop, then
    /// `X-Real-IP`, then the socket peer.
    pub fn audit(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> AuditContext {
        let mut context = AuditContext::actor(self.user.id);
        if let Some(ip) = client_ip(headers, peer) {
            context = context.with_ip(ip);
        }
        if let Some(agent) = header_str(headers, USER_AGENT.as_str()) {
            context = context.with_user_agent(agent);
        }
        context
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use gatehouse_auth::testutil;

    use super::*;

    #[test]
    fn forwarded_chain_wins_over_the_peer() {
        let principal = PrincipalContext::new(testutil::active_user("ctx-user", "s3cret!"));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4, 10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("admin-console/2"));

        let ctx = principal.audit(&headers, Some(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(ctx.actor, Some(principal.user_id()));
        assert_eq!(ctx.ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(ctx.user_agent.as_deref(), Some("admin-console/2"));
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let principal = PrincipalContext::new(testutil::active_user("ctx-peer", "s3cret!"));
        let ctx = principal.audit(&HeaderMap::new(), Some(SocketAddr::from(([192, 0, 2, 8], 5000))));
        assert_eq!(ctx.ip.as_deref(), Some("192.0.2.8"));
        assert_eq!(ctx.user_agent, None);

        assert_eq!(principal.audit(&HeaderMap::new(), None).ip, None);
    }
}
