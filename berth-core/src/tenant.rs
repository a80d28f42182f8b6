//! Core multi-tenant types for Berth.

use serde::{Deserialize, Serialize};

/// A tenant (company) identifier.
///
/// Always a positive integer; validation of the bound happens in the
/// namespace resolver, which is the only place a raw id is turned into
/// a storage namespace name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl TenantId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The authenticated request's resolved tenant, carried end-to-end from
/// credential validation through every data operation.
///
/// Derived either from the identity lookup table (login path) or from a
/// previously issued token (all subsequent requests). Never persisted;
/// its lifetime is one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    /// The identity (email) this context was resolved for.
    pub subject: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<TenantId>, subject: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            subject: subject.into(),
        }
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id.0
    }
}
