#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::TenancyResult;
use crate::namespace::NamespaceName;

/// A company row in the shared namespace. One per tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The global identity-to-tenant mapping row, used before a tenant
/// namespace is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupEntry {
    pub email: String,
    pub tenant_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Storage primitives the tenancy layer is built on.
///
/// Namespace creation must be atomic with respect to concurrent callers:
/// if two `create_namespace` calls race for the same name, exactly one
/// succeeds and the rest fail with `SchemaAlreadyExists`. That uniqueness
/// guarantee is the tie-break the lifecycle manager relies on instead of
/// an application-level lock.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    // --- shared-namespace rows ---

    async fn insert_company(&self, name: &str) -> TenancyResult<Company>;
    async fn get_company(&self, id: i64) -> TenancyResult<Option<Company>>;
    async fn delete_company(&self, id: i64) -> TenancyResult<bool>;
    async fn list_companies(&self) -> TenancyResult<Vec<Company>>;

    /// Insert an identity mapping. Fails with `DuplicateIdentity` if the
    /// email already has an entry; identities are globally unique.
    async fn insert_lookup(&self, email: &str, tenant_id: i64) -> TenancyResult<LookupEntry>;
    async fn get_lookup(&self, email: &str) -> TenancyResult<Option<LookupEntry>>;
    async fn delete_lookup(&self, email: &str) -> TenancyResult<bool>;
    async fn count_lookups(&self, tenant_id: i64) -> TenancyResult<u64>;

    // --- namespace DDL ---

    /// Create the namespace. Fails with `SchemaAlreadyExists` if present.
    async fn create_namespace(&self, ns: &NamespaceName) -> TenancyResult<()>;

    /// Create every tenant-catalog table inside the namespace.
    async fn create_tenant_tables(&self, ns: &NamespaceName) -> TenancyResult<()>;

    /// Cascading, idempotent drop. Succeeds if the namespace is absent.
    async fn drop_namespace(&self, ns: &NamespaceName) -> TenancyResult<()>;

    async fn namespace_exists(&self, ns: &NamespaceName) -> TenancyResult<bool>;

    // --- sessions ---

    /// Check a pooled connection out and bind it to the namespace.
    /// Blocks at most `timeout`; on expiry fails with `AcquireTimeout`
    /// without having mutated anything.
    async fn open_session(
        &self,
        ns: &NamespaceName,
        timeout: Duration,
    ) -> TenancyResult<Box<dyn TenantSession>>;
}

/// A pooled connection temporarily bound to one tenant's namespace.
///
/// Rows are JSON documents; `insert` assigns the id and returns the stored
/// document with the id merged in. Table names are validated against the
/// tenant catalog before any statement is built.
#[async_trait]
pub trait TenantSession: Send {
    fn namespace(&self) -> &NamespaceName;

    async fn insert(&mut self, table: &str, doc: Value) -> TenancyResult<Value>;
    async fn get(&mut self, table: &str, id: i64) -> TenancyResult<Option<Value>>;
    async fn find_by(&mut self, table: &str, field: &str, value: &str)
        -> TenancyResult<Option<Value>>;
    async fn list(&mut self, table: &str) -> TenancyResult<Vec<Value>>;
    async fn update(&mut self, table: &str, id: i64, doc: Value) -> TenancyResult<Option<Value>>;
    async fn delete(&mut self, table: &str, id: i64) -> TenancyResult<bool>;
    async fn count(&mut self, table: &str) -> TenancyResult<u64>;

    /// Reset the connection's active namespace to the neutral default and
    /// return it to the pool. This is the single most important correctness
    /// step in the system: a connection must never re-enter the pool still
    /// bound to a tenant.
    async fn release(self: Box<Self>) -> TenancyResult<()>;

    /// Synchronous last-resort cleanup, run by the scope guard when a
    /// session is dropped without an explicit release. Must guarantee the
    /// connection cannot re-enter the pool namespace-dirty.
    fn discard(&mut self);
}
