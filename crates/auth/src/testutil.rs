//! Fixed key material and fixtures for tests.
//!
//! Never use these keys outside tests: the private halves are checked in.

use std::time::Duration;

use chrono::Utc;

use crate::{KeyPair, Permission, Role, TokenService, User};

pub const ACCESS_PRIVATE_PEM: &str = include_str!("../testdata/access_private.pem");
pub const ACCESS_PUBLIC_PEM: &str = include_str!("../testdata/access_public.pem");
pub const REFRESH_PRIVATE_PEM: &str = include_str!("../testdata/refresh_private.pem");
pub const REFRESH_PUBLIC_PEM: &str = include_str!("../testdata/refresh_public.pem");

pub fn access_keys() -> KeyPair {
    KeyPair::from_rsa_pem(ACCESS_PRIVATE_PEM.as_bytes(), ACCESS_PUBLIC_PEM.as_bytes())
        .expect("access test keys parse")
}

pub fn refresh_keys() -> KeyPair {
    KeyPair::from_rsa_pem(REFRESH_PRIVATE_PEM.as_bytes(), REFRESH_PUBLIC_PEM.as_bytes())
        .expect("refresh test keys parse")
}

/// 15 minute access window, 60 minute refresh window.
pub fn token_service() -> TokenService {
    token_service_with(Duration::from_secs(15 * 60), Duration::from_secs(60 * 60))
}

pub fn token_service_with(access_ttl: Duration, refresh_ttl: Duration) -> TokenService {
    TokenService::new(access_keys(), refresh_keys(), access_ttl, refresh_ttl)
}

pub fn role(name: &str, permissions: &[&str]) -> Role {
    Role::new(
        name,
        permissions.iter().map(|p| Permission::from(*p)).collect(),
        true,
        Utc::now(),
    )
    .expect("valid test role")
}

/// An enabled user with `password` set and no roles.
pub fn active_user(username: &str, password: &str) -> User {
    let now = Utc::now();
    let mut user = User::new(
        format!("{username} test"),
        username,
        format!("{username}@example.com"),
        true,
        now,
    )
    .expect("valid test user");
    user.credential
        .set_password(password, now)
        .expect("valid test password");
    user
}
