//! Login, refresh, "who am I" and logout over one session-token reference.
//!
//! A reference lives on the user's credential and is embedded in both the
//! access and the refresh envelope. Logout revokes it for the longest
//! envelope lifetime and clears it from the credential, so the next login
//! mints a fresh one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use gatehouse_auth::{KeyClass, TokenService, User};
use gatehouse_core::UserId;

use crate::deadline::Deadline;
use crate::error::{ServiceError, ServiceResult};
use crate::revocation::RevocationRegistry;
use crate::services::views::{AuthOutput, UserView};
use crate::store::{StoreError, UserStore};

#[derive(Clone, Deserialize)]
pub struct LoginInput {
    pub login: String,
    pub password: String,
    /// `false` issues envelopes without an `exp` claim.
    #[serde(default = "default_expiration")]
    pub expiration: bool,
}

fn default_expiration() -> bool {
    true
}

impl fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginInput")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Store call on the authentication path: a missed deadline rejects.
async fn on_auth_path<T>(
    deadline: Deadline,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> ServiceResult<T> {
    match deadline.run(fut).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => {
            warn!("deadline elapsed on authentication path");
            Err(ServiceError::Unauthenticated)
        }
    }
}

/// Argon2 is CPU-heavy; keep it off the async workers.
async fn verify_off_thread(check: impl FnOnce() -> bool + Send + 'static) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(check)
        .await
        .map_err(|e| ServiceError::internal(format!("password verification task failed: {e}")))
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    revocations: Arc<dyn RevocationRegistry>,
    tokens: Arc<TokenService>,
}

impl fmt::Debug for SessionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn RevocationRegistry>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            revocations,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Username, then password, then status. An unknown username and a wrong
    /// password are indistinguishable to the caller.
    #[instrument(skip_all, fields(login = %input.login))]
    pub async fn login(&self, input: &LoginInput, deadline: Deadline) -> ServiceResult<AuthOutput> {
        let Some(user) = on_auth_path(deadline, self.users.find_by_username(&input.login)).await? else {
            debug!("login for unknown username");
            let password = input.password.clone();
            verify_off_thread(move || gatehouse_auth::password::verify_without_hash(&password)).await?;
            return Err(ServiceError::InvalidCredentials);
        };

        let credential = user.credential.clone();
        let password = input.password.clone();
        let verified = verify_off_thread(move || credential.verify_password(&password)).await?;
        if !verified {
            debug!(user_id = %user.id, "login with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active() {
            debug!(user_id = %user.id, "login for disabled or unprovisioned user");
            return Err(ServiceError::DisabledPrincipal);
        }

        let output = self.issue(user, input.expiration, deadline).await?;
        info!(user_id = %output.user.id, "login succeeded");
        Ok(output)
    }

    /// Re-issue both envelopes over the same reference.
    #[instrument(skip(self, deadline))]
    pub async fn refresh(
        &self,
        user_id: UserId,
        expiration: bool,
        deadline: Deadline,
    ) -> ServiceResult<AuthOutput> {
        let user = on_auth_path(deadline, self.users.find_by_id(user_id))
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        if !user.is_active() {
            return Err(ServiceError::Unauthenticated);
        }
        self.issue(user, expiration, deadline).await
    }

    #[instrument(skip(self, deadline))]
    pub async fn me(&self, user_id: UserId, deadline: Deadline) -> ServiceResult<UserView> {
        let user = on_auth_path(deadline, self.users.find_by_id(user_id))
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        Ok(UserView::from(&user))
    }

    /// Revoke the reference behind `raw` (either class) and detach it from
    /// the credential.
    #[instrument(skip_all)]
    pub async fn logout(&self, raw: &str, deadline: Deadline) -> ServiceResult<()> {
        let now = Utc::now();
        let (class, claims) = self.tokens.verify_any(raw, now).map_err(|e| {
            debug!(error = %e, "logout with unusable credential");
            ServiceError::Unauthenticated
        })?;

        match deadline
            .run(self.revocations.revoke(&claims.token, self.tokens.max_ttl()))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "revocation registry unavailable during logout");
                return Err(ServiceError::internal(e.to_string()));
            }
            Err(_) => {
                error!("deadline elapsed while revoking session");
                return Err(ServiceError::internal("revocation timed out"));
            }
        }

        // The reference is already dead; failing to clear it only delays the
        // next login's fresh reference.
        match deadline.run(self.users.find_by_token(&claims.token)).await {
            Ok(Ok(Some(mut user))) => {
                user.credential.clear_token(now);
                match deadline.run(self.users.update(&user)).await {
                    Ok(Ok(())) => info!(user_id = %user.id, via = %class, "logout succeeded"),
                    Ok(Err(e)) => warn!(user_id = %user.id, error = %e, "failed to clear session reference"),
                    Err(_) => warn!(user_id = %user.id, "deadline elapsed clearing session reference"),
                }
            }
            Ok(Ok(None)) => debug!("logout for a reference no user holds"),
            Ok(Err(e)) => warn!(error = %e, "failed to resolve user during logout"),
            Err(_) => warn!("deadline elapsed resolving user during logout"),
        }
        Ok(())
    }

    /// Verify `raw` with the `class` key, consult the registry and resolve the
    /// active user holding the embedded reference.
    #[instrument(skip(self, raw, deadline))]
    pub async fn authenticate(
        &self,
        raw: &str,
        class: KeyClass,
        deadline: Deadline,
    ) -> ServiceResult<User> {
        let claims = self.tokens.verify(raw, class, Utc::now()).map_err(|e| {
            debug!(error = %e, "credential rejected");
            ServiceError::from(e)
        })?;

        self.ensure_not_revoked(&claims.token, deadline).await?;

        let user = on_auth_path(deadline, self.users.find_by_token(&claims.token))
            .await?
            .ok_or_else(|| {
                debug!("no user holds the presented reference");
                ServiceError::Unauthenticated
            })?;
        if !user.is_active() {
            debug!(user_id = %user.id, "credential of disabled user presented");
            return Err(ServiceError::Unauthenticated);
        }
        Ok(user)
    }

    async fn ensure_not_revoked(&self, reference: &str, deadline: Deadline) -> ServiceResult<()> {
        match deadline.run(self.revocations.is_revoked(reference)).await {
            Ok(Ok(false)) => Ok(()),
            Ok(Ok(true)) => {
                debug!("revoked reference presented");
                Err(ServiceError::Unauthenticated)
            }
            Ok(Err(e)) => {
                error!(error = %e, "revocation registry unreachable; rejecting");
                Err(e.into())
            }
            Err(_) => {
                error!("deadline elapsed consulting revocation registry; rejecting");
                Err(ServiceError::Unauthenticated)
            }
        }
    }

    /// Sign a pair over the user's reference, minting and persisting one
    /// first when the credential has none (or only a revoked one).
    async fn issue(&self, mut user: User, expiration: bool, deadline: Deadline) -> ServiceResult<AuthOutput> {
        let reusable = match user.session_token() {
            Some(existing) => self.ensure_not_revoked(existing, deadline).await.is_ok(),
            None => false,
        };

        if !reusable {
            user.credential.set_token(Uuid::new_v4().to_string(), Utc::now());
            on_auth_path(deadline, self.users.update(&user)).await?;
        }

        let reference = user
            .session_token()
            .ok_or_else(|| ServiceError::internal("credential lost its session reference"))?;
        let pair = self.tokens.sign_pair(reference, expiration, Utc::now())?;

        Ok(AuthOutput {
            user: UserView::from(&user),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }
}
