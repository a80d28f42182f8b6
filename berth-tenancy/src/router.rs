//! # Tenant session routing
//!
//! Routes each authenticated request's data session into the right
//! namespace. `acquire` validates namespace existence (through a bounded
//! tenant-keyed cache), checks a pooled connection out, and binds it to
//! the tenant; the returned [`ScopedSession`] guarantees the connection
//! is reset before it can ever re-enter the pool, on every exit path.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{StorageBackend, TenantSession};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::NamespaceResolver;
use crate::options::TenancyOptions;

/// Bounded tenant-keyed namespace-existence cache.
///
/// Shared between the router (reads on every request) and the lifecycle
/// manager, which populates it on successful create before returning and
/// invalidates it synchronously on drop. A racing request can therefore
/// never observe a namespace as present after it has been dropped.
pub struct NamespaceCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<i64, bool>,
    order: VecDeque<i64>,
}

impl NamespaceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn lookup(&self, tenant_id: i64) -> Option<bool> {
        self.inner.lock().entries.get(&tenant_id).copied()
    }

    /// Lifecycle write: create and drop go through here and always win.
    pub fn store(&self, tenant_id: i64, exists: bool) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(tenant_id, exists).is_none() {
            inner.order.push_back(tenant_id);
        }
        self.evict_over_capacity(&mut inner);
    }

    /// Read-path write: populate with a value read from the backend, but
    /// never overwrite an entry a lifecycle operation stored while that
    /// read was in flight. Returns the value that ends up cached, which
    /// is the value the caller must act on.
    pub fn store_if_absent(&self, tenant_id: i64, exists: bool) -> bool {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.entries.get(&tenant_id) {
            return *cached;
        }
        inner.entries.insert(tenant_id, exists);
        inner.order.push_back(tenant_id);
        self.evict_over_capacity(&mut inner);
        exists
    }

    fn evict_over_capacity(&self, inner: &mut CacheInner) {
        while inner.entries.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tenant-bound data session with scoped-acquisition discipline.
///
/// The CRUD layer obtains one of these at the start of every request and
/// runs all entity reads and writes through it. Explicit [`release`]
/// resets the connection's namespace and returns it to the pool; if the
/// session is dropped instead (business error, panic unwind, task
/// cancellation), the guard discards the connection so it can never be
/// repooled still bound to a tenant.
///
/// [`release`]: ScopedSession::release
pub struct ScopedSession {
    tenant_id: i64,
    inner: Option<Box<dyn TenantSession>>,
}

impl ScopedSession {
    pub(crate) fn new(tenant_id: i64, inner: Box<dyn TenantSession>) -> Self {
        Self {
            tenant_id,
            inner: Some(inner),
        }
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    fn session(&mut self) -> TenancyResult<&mut Box<dyn TenantSession>> {
        self.inner
            .as_mut()
            .ok_or_else(|| TenancyError::Storage("session already released".to_string()))
    }

    pub async fn insert(&mut self, table: &str, doc: Value) -> TenancyResult<Value> {
        self.session()?.insert(table, doc).await
    }

    pub async fn get(&mut self, table: &str, id: i64) -> TenancyResult<Option<Value>> {
        self.session()?.get(table, id).await
    }

    pub async fn find_by(
        &mut self,
        table: &str,
        field: &str,
        value: &str,
    ) -> TenancyResult<Option<Value>> {
        self.session()?.find_by(table, field, value).await
    }

    pub async fn list(&mut self, table: &str) -> TenancyResult<Vec<Value>> {
        self.session()?.list(table).await
    }

    pub async fn update(
        &mut self,
        table: &str,
        id: i64,
        doc: Value,
    ) -> TenancyResult<Option<Value>> {
        self.session()?.update(table, id, doc).await
    }

    pub async fn delete(&mut self, table: &str, id: i64) -> TenancyResult<bool> {
        self.session()?.delete(table, id).await
    }

    pub async fn count(&mut self, table: &str) -> TenancyResult<u64> {
        self.session()?.count(table).await
    }

    /// Reset the connection's active namespace and return it to the pool.
    pub async fn release(mut self) -> TenancyResult<()> {
        match self.inner.take() {
            Some(session) => session.release().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ScopedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("tenant_id", &self.tenant_id)
            .field("released", &self.inner.is_none())
            .finish()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.inner.take() {
            tracing::debug!(
                tenant_id = self.tenant_id,
                "scoped session dropped without release, discarding connection"
            );
            session.discard();
        }
    }
}

/// Routes requests into tenant namespaces over a shared backend.
#[derive(Clone)]
pub struct SessionRouter {
    backend: Arc<dyn StorageBackend>,
    resolver: NamespaceResolver,
    cache: Arc<NamespaceCache>,
    acquire_timeout: Duration,
}

impl SessionRouter {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        options: &TenancyOptions,
        cache: Arc<NamespaceCache>,
    ) -> Self {
        Self {
            backend,
            resolver: NamespaceResolver::new(options.max_tenant_id),
            cache,
            acquire_timeout: options.acquire_timeout,
        }
    }

    /// Open a scoped session bound to the tenant's namespace.
    ///
    /// Fails with `SchemaNotFound` if no namespace exists for the tenant,
    /// or `AcquireTimeout` if the pool cannot hand out a connection within
    /// the configured budget (nothing has been mutated in that case).
    pub async fn acquire(&self, tenant_id: i64) -> TenancyResult<ScopedSession> {
        let ns = self.resolver.resolve(tenant_id)?;

        let exists = match self.cache.lookup(tenant_id) {
            Some(cached) => cached,
            None => {
                let exists = self.backend.namespace_exists(&ns).await?;
                // A drop may have invalidated the entry while this read
                // was in flight; its write wins over the stale read.
                self.cache.store_if_absent(tenant_id, exists)
            }
        };
        if !exists {
            return Err(TenancyError::SchemaNotFound(tenant_id));
        }

        let session = self.backend.open_session(&ns, self.acquire_timeout).await?;
        Ok(ScopedSession::new(tenant_id, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_caps_entries_in_insertion_order() {
        let cache = NamespaceCache::new(2);
        cache.store(1, true);
        cache.store(2, true);
        cache.store(3, true);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(1), None);
        assert_eq!(cache.lookup(2), Some(true));
        assert_eq!(cache.lookup(3), Some(true));
    }

    #[test]
    fn read_path_store_never_overwrites_lifecycle_write() {
        let cache = NamespaceCache::new(8);
        // Drop invalidated the entry while a backend read was in flight.
        cache.store(7, false);
        assert!(!cache.store_if_absent(7, true));
        assert_eq!(cache.lookup(7), Some(false));

        // On a vacant entry the read result is what gets cached.
        assert!(cache.store_if_absent(8, true));
        assert_eq!(cache.lookup(8), Some(true));
    }

    #[test]
    fn cache_overwrites_without_duplicating_order() {
        let cache = NamespaceCache::new(2);
        cache.store(1, true);
        cache.store(1, false);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(1), Some(false));
    }
}
