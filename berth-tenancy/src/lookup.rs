//! # Identity lookup
//!
//! Maps a global login identity (email) to its tenant via the public,
//! schema-less mapping table. This is the only tenant-related read that
//! happens before a tenant namespace is known.

use std::sync::Arc;

use crate::backend::{LookupEntry, StorageBackend};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::NamespaceResolver;

#[derive(Clone)]
pub struct TenantLookupService {
    backend: Arc<dyn StorageBackend>,
    resolver: NamespaceResolver,
}

impl TenantLookupService {
    pub fn new(backend: Arc<dyn StorageBackend>, resolver: NamespaceResolver) -> Self {
        Self { backend, resolver }
    }

    /// Resolve the tenant id for an identity. Fails with `LookupNotFound`
    /// if the email has no entry.
    pub async fn resolve_tenant(&self, email: &str) -> TenancyResult<i64> {
        match self.backend.get_lookup(email).await? {
            Some(entry) => Ok(entry.tenant_id),
            None => Err(TenancyError::LookupNotFound),
        }
    }

    /// Register an identity for a tenant.
    ///
    /// Identities are globally unique across all tenants; a second entry
    /// for the same email fails with `DuplicateIdentity`. An entry may
    /// only reference a tenant whose namespace currently exists.
    pub async fn register(&self, email: &str, tenant_id: i64) -> TenancyResult<LookupEntry> {
        let ns = self.resolver.resolve(tenant_id)?;
        if !self.backend.namespace_exists(&ns).await? {
            return Err(TenancyError::SchemaNotFound(tenant_id));
        }
        self.backend.insert_lookup(email, tenant_id).await
    }

    /// Delete an identity's entry; called when the owning account is
    /// removed. Returns whether an entry existed.
    pub async fn remove(&self, email: &str) -> TenancyResult<bool> {
        self.backend.delete_lookup(email).await
    }

    /// Number of identities still referencing a tenant. Used as the
    /// emptiness precondition for tenant deletion.
    pub async fn count_for_tenant(&self, tenant_id: i64) -> TenancyResult<u64> {
        self.backend.count_lookups(tenant_id).await
    }
}
