//! # Schema lifecycle
//!
//! Creates and destroys tenant namespaces. Namespace and table DDL is not
//! guaranteed to be atomic with a surrounding transaction on every
//! backend, so `create` is run as an explicit saga: each step after the
//! namespace exists is compensated by an idempotent cascading drop if a
//! later step fails. Concurrent creates for the same company are resolved
//! by the backend's uniqueness guarantee on the namespace itself, not by
//! an application-level lock, so the tie-break survives process restarts.

use std::sync::Arc;

use crate::backend::{Company, StorageBackend};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::{NamespaceName, NamespaceResolver};
use crate::options::TenancyOptions;
use crate::router::{NamespaceCache, ScopedSession};
use crate::seed::ReferenceDataSeeder;

#[derive(Clone)]
pub struct SchemaLifecycle {
    backend: Arc<dyn StorageBackend>,
    resolver: NamespaceResolver,
    seeder: ReferenceDataSeeder,
    cache: Arc<NamespaceCache>,
    options: TenancyOptions,
}

impl SchemaLifecycle {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        options: TenancyOptions,
        seeder: ReferenceDataSeeder,
        cache: Arc<NamespaceCache>,
    ) -> Self {
        Self {
            backend,
            resolver: NamespaceResolver::new(options.max_tenant_id),
            seeder,
            cache,
            options,
        }
    }

    /// Create the company row and provision its namespace in one call.
    ///
    /// If provisioning fails the company row is deleted again, so a
    /// company record never claims a namespace that does not exist.
    pub async fn provision(&self, company_name: &str) -> TenancyResult<Company> {
        let company = self.backend.insert_company(company_name).await?;
        if let Err(err) = self.create(company.id).await {
            if let Err(del) = self.backend.delete_company(company.id).await {
                tracing::error!(
                    company_id = company.id,
                    error = %del,
                    "failed to delete company row after provisioning failure"
                );
            }
            return Err(err);
        }
        Ok(company)
    }

    /// Provision the namespace for an existing company: create the
    /// namespace, create every tenant table inside it, seed the default
    /// reference data, and only then publish existence to the cache.
    pub async fn create(&self, company_id: i64) -> TenancyResult<()> {
        let ns = self.resolver.resolve(company_id)?;

        self.backend
            .get_company(company_id)
            .await?
            .ok_or(TenancyError::CompanyNotFound(company_id))?;
        if self.backend.namespace_exists(&ns).await? {
            return Err(TenancyError::SchemaAlreadyExists(company_id));
        }

        // The backend's uniqueness guarantee settles races here: between
        // the check above and this call another create may have won, in
        // which case this surfaces SchemaAlreadyExists and nothing below
        // runs.
        self.backend.create_namespace(&ns).await?;

        if let Err(err) = self.build_namespace(&ns).await {
            return Err(self.compensate(company_id, &ns, err).await);
        }

        self.cache.store(company_id, true);
        tracing::info!(company_id, namespace = %ns, "provisioned tenant schema");
        Ok(())
    }

    /// Destroy a tenant: cascading namespace drop, then the company row.
    ///
    /// Irrecoverable; there is no soft delete. Fails with `SchemaNotFound`
    /// if no namespace exists and `TenantNotEmpty` while any identity
    /// still references the tenant.
    pub async fn destroy(&self, company_id: i64) -> TenancyResult<()> {
        let ns = self.resolver.resolve(company_id)?;

        if !self.backend.namespace_exists(&ns).await? {
            return Err(TenancyError::SchemaNotFound(company_id));
        }
        let remaining = self.backend.count_lookups(company_id).await?;
        if remaining > 0 {
            return Err(TenancyError::TenantNotEmpty {
                tenant_id: company_id,
                remaining,
            });
        }

        // Invalidate before the drop so a racing acquire can never observe
        // the namespace as present after it is gone.
        self.cache.store(company_id, false);
        self.backend.drop_namespace(&ns).await?;
        self.backend.delete_company(company_id).await?;

        tracing::info!(company_id, namespace = %ns, "dropped tenant schema");
        Ok(())
    }

    /// Steps after namespace creation; any failure here is compensated.
    async fn build_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        self.backend.create_tenant_tables(ns).await?;

        let session = self
            .backend
            .open_session(ns, self.options.acquire_timeout)
            .await?;
        let mut scoped = ScopedSession::new(ns.tenant_id(), session);
        let seeded = self.seeder.seed(&mut scoped).await;
        scoped.release().await?;
        seeded
    }

    /// Compensating cleanup: cascading drop of the half-built namespace.
    /// The drop is idempotent, so repeated failures never leave partial
    /// state; if even the drop fails the error is reported as a distinct
    /// fatal condition since an orphaned namespace is left behind.
    async fn compensate(
        &self,
        company_id: i64,
        ns: &NamespaceName,
        cause: TenancyError,
    ) -> TenancyError {
        tracing::warn!(
            company_id,
            namespace = %ns,
            error = %cause,
            "provisioning failed, dropping partially built schema"
        );
        match self.backend.drop_namespace(ns).await {
            Ok(()) => TenancyError::ProvisioningFailed {
                tenant_id: company_id,
                reason: cause.to_string(),
            },
            Err(drop_err) => {
                tracing::error!(
                    company_id,
                    namespace = %ns,
                    error = %drop_err,
                    "compensating drop failed, schema orphaned"
                );
                TenancyError::CompensationFailed {
                    tenant_id: company_id,
                    reason: drop_err.to_string(),
                }
            }
        }
    }
}
