// Authentication options and configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// JWT signing and validation configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthOptions {
    /// HMAC signing secret (HS256).
    pub secret: String,
    /// Token issuer (iss claim).
    pub issuer: String,
    /// Token audience (aud claim).
    pub audience: Vec<String>,
    /// Access token expiration duration.
    #[serde(with = "humantime_serde")]
    pub access_token_expires_in: Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "berth-auth".to_string(),
            audience: vec!["berth-api".to_string()],
            access_token_expires_in: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl AuthOptions {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.secret.is_empty() {
            return Err(AuthError::Config("signing secret cannot be empty".into()));
        }
        if self.issuer.is_empty() {
            return Err(AuthError::Config("issuer cannot be empty".into()));
        }
        if self.audience.is_empty() {
            return Err(AuthError::Config("audience cannot be empty".into()));
        }
        if self.access_token_expires_in.as_secs() == 0 {
            return Err(AuthError::Config(
                "access token expiration must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
