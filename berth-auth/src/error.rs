//! Authentication error taxonomy.
//!
//! Login failures are deliberately coarse: a missing identity mapping, an
//! unknown user row, a dropped namespace, and a wrong password all surface
//! as [`AuthError::AuthenticationFailed`] so the response never reveals
//! whether an email is registered. The one exception is a known user whose
//! account is disabled, which callers are allowed to name.

use berth_tenancy::TenancyError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Any credential failure: unknown email, missing user, bad password.
    #[error("Incorrect email or password")]
    AuthenticationFailed,

    /// The credentials matched but the account is disabled.
    #[error("Inactive user")]
    InactiveAccount,

    /// The bearer token is missing, malformed, expired, or carries claims
    /// that do not resolve to a tenant.
    #[error("Could not validate credentials")]
    TokenInvalid,

    /// The email is already registered, in this tenant or another.
    #[error("user with email {0} already exists")]
    UserAlreadyExists(String),

    #[error("invalid authentication configuration: {0}")]
    Config(String),

    /// Infrastructure failures pass through with their own status codes.
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
}

impl AuthError {
    /// HTTP status an outer transport layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthenticationFailed | Self::TokenInvalid => 401,
            Self::InactiveAccount => 400,
            Self::UserAlreadyExists(_) => 409,
            Self::Config(_) => 500,
            Self::Tenancy(e) => e.status_code(),
        }
    }
}
