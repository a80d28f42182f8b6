//! Engine facade wiring the tenancy components over one backend.

use std::sync::Arc;

use crate::backend::StorageBackend;
use crate::error::TenancyResult;
use crate::lifecycle::SchemaLifecycle;
use crate::lookup::TenantLookupService;
use crate::namespace::NamespaceResolver;
use crate::options::TenancyOptions;
use crate::router::{NamespaceCache, SessionRouter};
use crate::seed::{ReferenceCatalog, ReferenceDataSeeder};

/// Owns the shared pieces (backend handle, existence cache) and hands out
/// the routed components. The pool and the cache are the only shared
/// mutable resources in the system; both live here, tenant-keyed and
/// globally synchronized, never partitioned by copying.
pub struct TenancyEngine {
    backend: Arc<dyn StorageBackend>,
    router: SessionRouter,
    lifecycle: SchemaLifecycle,
    lookup: TenantLookupService,
}

impl TenancyEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, options: TenancyOptions) -> TenancyResult<Self> {
        Self::with_catalog(backend, options, ReferenceCatalog::default())
    }

    pub fn with_catalog(
        backend: Arc<dyn StorageBackend>,
        options: TenancyOptions,
        catalog: ReferenceCatalog,
    ) -> TenancyResult<Self> {
        options
            .validate()
            .map_err(crate::error::TenancyError::Storage)?;

        let cache = Arc::new(NamespaceCache::new(options.cache_capacity));
        let resolver = NamespaceResolver::new(options.max_tenant_id);
        let seeder = ReferenceDataSeeder::new(catalog);

        Ok(Self {
            router: SessionRouter::new(backend.clone(), &options, cache.clone()),
            lifecycle: SchemaLifecycle::new(backend.clone(), options, seeder, cache),
            lookup: TenantLookupService::new(backend.clone(), resolver),
            backend,
        })
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    pub fn lifecycle(&self) -> &SchemaLifecycle {
        &self.lifecycle
    }

    pub fn lookup(&self) -> &TenantLookupService {
        &self.lookup
    }
}
