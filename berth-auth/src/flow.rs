//! Login flow.
//!
//! A login moves through a small state machine: identity lookup, tenant
//! namespace verification, then credential checking inside the tenant's
//! own namespace. Every rejection before the final state collapses into
//! the same `AuthenticationFailed` response; the precise reason is only
//! ever logged, never returned. Infrastructure failures (pool exhaustion,
//! storage errors) are not login rejections and keep their own errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use berth_core::TenantContext;
use berth_tenancy::{ScopedSession, SessionRouter, TenancyError, TenantLookupService};

use crate::error::{AuthError, AuthResult};
use crate::token::TokenIssuer;

/// Where a login attempt currently stands. Terminal states are
/// `Authenticated` and `Rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginState {
    Unauthenticated,
    LookupPending,
    TenantVerifying,
    Authenticated,
    Rejected,
}

/// A successfully issued access token, shaped for an OAuth2 password-flow
/// response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Clone)]
pub struct LoginService {
    lookup: TenantLookupService,
    router: SessionRouter,
    issuer: TokenIssuer,
}

impl LoginService {
    pub fn new(lookup: TenantLookupService, router: SessionRouter, issuer: TokenIssuer) -> Self {
        Self {
            lookup,
            router,
            issuer,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Authenticate an email/password pair and issue an access token.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedToken> {
        let mut state = LoginState::LookupPending;
        let tenant_id = match self.lookup.resolve_tenant(email).await {
            Ok(id) => id,
            Err(TenancyError::LookupNotFound) => {
                return Err(self.reject(state, email, "no identity mapping"));
            }
            Err(e) => return Err(e.into()),
        };

        state = LoginState::TenantVerifying;
        let mut session = match self.router.acquire(tenant_id).await {
            Ok(session) => session,
            // A stale mapping to a dropped namespace is a credential
            // failure from the caller's point of view.
            Err(TenancyError::SchemaNotFound(_))
            | Err(TenancyError::InvalidTenantIdentifier(_)) => {
                return Err(self.reject(state, email, "tenant namespace missing"));
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = self.verify_credentials(&mut session, email, password).await;
        session.release().await?;
        let user = match outcome {
            Ok(user) => user,
            Err(reason) => return Err(self.reject(state, email, reason)),
        };

        if !user.get("is_active").and_then(Value::as_bool).unwrap_or(false) {
            // The only distinguishable rejection: credentials were valid.
            tracing::debug!(email, tenant_id, "login rejected, account inactive");
            return Err(AuthError::InactiveAccount);
        }

        state = LoginState::Authenticated;
        let access_token = self.issuer.sign(email, tenant_id)?;
        tracing::debug!(email, tenant_id, state = ?state, "login succeeded");
        Ok(IssuedToken {
            access_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Verify a bearer token and rebuild the tenant context it carries.
    pub fn authorize(&self, token: &str) -> AuthResult<TenantContext> {
        self.issuer.verify(token)
    }

    async fn verify_credentials(
        &self,
        session: &mut ScopedSession,
        email: &str,
        password: &str,
    ) -> Result<Value, &'static str> {
        let user = match session.find_by("users", "email", email).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err("no user row in tenant namespace"),
            Err(_) => return Err("user lookup failed"),
        };

        let stored_hash = user
            .get("password_hash")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !crate::password::verify_password(password, stored_hash) {
            return Err("password mismatch");
        }
        Ok(user)
    }

    fn reject(&self, state: LoginState, email: &str, reason: &str) -> AuthError {
        tracing::debug!(email, state = ?state, reason, "login rejected");
        AuthError::AuthenticationFailed
    }
}
