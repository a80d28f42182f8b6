//! JWT issuance and verification.
//!
//! Tokens are HS256-signed and carry the authenticated subject plus the
//! tenant the session was established against. Verification re-derives a
//! [`TenantContext`] from the claims; every later data access goes through
//! that context's tenant id, so a token that fails here never reaches
//! storage.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use berth_core::TenantContext;

use crate::error::{AuthError, AuthResult};
use crate::options::AuthOptions;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated identity (email).
    pub sub: String,
    /// Tenant the session is scoped to.
    pub tenant_id: i64,
    pub iss: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let prefix = "Bearer ";
    if header.len() <= prefix.len() || !header.starts_with(prefix) {
        return None;
    }
    Some(header[prefix.len()..].trim())
}

#[derive(Clone)]
pub struct TokenIssuer {
    options: AuthOptions,
}

impl TokenIssuer {
    pub fn new(options: AuthOptions) -> AuthResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn access_token_expires_in(&self) -> std::time::Duration {
        self.options.access_token_expires_in
    }

    pub fn sign(&self, subject: &str, tenant_id: i64) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            tenant_id,
            iss: self.options.issuer.clone(),
            aud: self.options.audience.clone(),
            iat: now,
            exp: now + self.options.access_token_expires_in.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.options.secret.as_bytes()),
        )
        .map_err(|_| AuthError::TokenInvalid)
    }

    pub fn verify(&self, token: &str) -> AuthResult<TenantContext> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.options.issuer.as_str()]);
        validation.set_audience(
            &self
                .options
                .audience
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
        );

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.options.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::TokenInvalid)?;

        let claims = decoded.claims;
        if claims.sub.is_empty() || claims.tenant_id < 1 {
            return Err(AuthError::TokenInvalid);
        }
        Ok(TenantContext::new(claims.tenant_id, claims.sub))
    }
}
