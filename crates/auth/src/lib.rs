//! `gatehouse-auth`: pure identity, credential and authorization model.
//!
//! This crate is intentionally decoupled from HTTP and storage: it hashes
//! passwords, signs and verifies session envelopes, and decides permissions.

pub mod authorize;
pub mod claims;
pub mod credential;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod token;
pub mod user;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use authorize::{AuthorizationExplanation, AuthzError, authorize, authorize_request, explain, require_authenticated};
pub use claims::{SessionClaims, TokenError, validate_claims};
pub use credential::Credential;
pub use password::PasswordError;
pub use permissions::Permission;
pub use roles::{ROOT_ROLE, Role};
pub use token::{KeyClass, KeyPair, TokenPair, TokenService};
pub use user::User;
