use thiserror::Error;

/// Result type for tenancy operations
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Error taxonomy for the tenancy layer.
///
/// Lifecycle errors surface verbatim to the administrative caller; the
/// login flow coalesces everything it hits into a single generic
/// authentication failure before crossing the system boundary.
#[derive(Error, Debug, Clone)]
pub enum TenancyError {
    /// Malformed or out-of-range tenant id. Always a caller bug.
    #[error("Invalid tenant identifier: {0}")]
    InvalidTenantIdentifier(i64),

    #[error("Tenant schema already exists for company {0}")]
    SchemaAlreadyExists(i64),

    #[error("No tenant schema exists for company {0}")]
    SchemaNotFound(i64),

    #[error("Company not found: {0}")]
    CompanyNotFound(i64),

    /// Deletion precondition: identities still reference the tenant.
    #[error("Company {tenant_id} still has {remaining} registered identities")]
    TenantNotEmpty { tenant_id: i64, remaining: u64 },

    /// A multi-step create failed after the namespace was made; the
    /// compensating drop ran and the original cause is carried here.
    #[error("Provisioning failed for company {tenant_id}: {reason}")]
    ProvisioningFailed { tenant_id: i64, reason: String },

    /// The compensating drop itself failed, leaving an orphaned
    /// namespace. Requires operator intervention.
    #[error("Compensation failed for company {tenant_id}, orphaned schema needs manual cleanup: {reason}")]
    CompensationFailed { tenant_id: i64, reason: String },

    #[error("Identity already registered: {0}")]
    DuplicateIdentity(String),

    #[error("No tenant mapping for identity")]
    LookupNotFound,

    #[error("Timed out waiting for a pooled connection")]
    AcquireTimeout,

    #[error("Table not declared in the tenant catalog: {0}")]
    UnknownTable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TenancyError {
    /// Create a storage error from any backend failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// HTTP status for the transport layer. The tenancy crate itself is
    /// transport-agnostic; the server crate decides how to serialize.
    pub fn status_code(&self) -> u16 {
        match self {
            TenancyError::InvalidTenantIdentifier(_) => 400,
            TenancyError::SchemaAlreadyExists(_) => 409,
            TenancyError::SchemaNotFound(_) => 404,
            TenancyError::CompanyNotFound(_) => 404,
            TenancyError::TenantNotEmpty { .. } => 409,
            TenancyError::DuplicateIdentity(_) => 409,
            TenancyError::LookupNotFound => 404,
            TenancyError::UnknownTable(_) => 400,
            TenancyError::AcquireTimeout => 503,
            TenancyError::ProvisioningFailed { .. }
            | TenancyError::CompensationFailed { .. }
            | TenancyError::Storage(_) => 500,
        }
    }
}
