use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};

use berth_core::catalog::TENANT_CATALOG;

use crate::backend::memory::pool::{MemoryPool, PooledConn};
use crate::backend::{Company, LookupEntry, StorageBackend, TenantSession};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::NamespaceName;

/// Shared-namespace rows.
#[derive(Debug, Default)]
struct GlobalStore {
    companies: BTreeMap<i64, Company>,
    next_company_id: i64,
    lookups: HashMap<String, LookupEntry>,
}

/// One tenant namespace: table name -> rows keyed by id.
#[derive(Debug, Default)]
struct NamespaceData {
    tables: HashMap<String, BTreeMap<i64, Value>>,
    next_id: i64,
}

/// In-memory backend. Namespace creation is an insert-if-absent under a
/// single write lock, which gives the same uniqueness tie-break a real
/// schema catalog provides.
pub struct MemoryBackend {
    global: RwLock<GlobalStore>,
    namespaces: Arc<RwLock<HashMap<String, NamespaceData>>>,
    pool: Arc<MemoryPool>,
    fail_next_table_create: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_pool_size(8)
    }

    pub fn with_pool_size(size: usize) -> Self {
        Self {
            global: RwLock::new(GlobalStore {
                next_company_id: 1,
                ..Default::default()
            }),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(MemoryPool::new(size)),
            fail_next_table_create: AtomicBool::new(false),
        }
    }

    /// Test helper: make the next `create_tenant_tables` call fail, to
    /// exercise the provisioning compensation path.
    pub fn fail_next_table_create(&self) {
        self.fail_next_table_create.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_company(&self, name: &str) -> TenancyResult<Company> {
        let mut global = self.global.write();
        let id = global.next_company_id;
        global.next_company_id += 1;
        let company = Company {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        global.companies.insert(id, company.clone());
        Ok(company)
    }

    async fn get_company(&self, id: i64) -> TenancyResult<Option<Company>> {
        Ok(self.global.read().companies.get(&id).cloned())
    }

    async fn delete_company(&self, id: i64) -> TenancyResult<bool> {
        let mut global = self.global.write();
        // Same cascade the relational backend gets from its foreign key:
        // a lookup entry never outlives its company row, even one racing
        // in between the destroy preconditions and the drop.
        global.lookups.retain(|_, entry| entry.tenant_id != id);
        Ok(global.companies.remove(&id).is_some())
    }

    async fn list_companies(&self) -> TenancyResult<Vec<Company>> {
        Ok(self.global.read().companies.values().cloned().collect())
    }

    async fn insert_lookup(&self, email: &str, tenant_id: i64) -> TenancyResult<LookupEntry> {
        let mut global = self.global.write();
        if !global.companies.contains_key(&tenant_id) {
            return Err(TenancyError::CompanyNotFound(tenant_id));
        }
        if global.lookups.contains_key(email) {
            return Err(TenancyError::DuplicateIdentity(email.to_string()));
        }
        let entry = LookupEntry {
            email: email.to_string(),
            tenant_id,
            created_at: Utc::now(),
        };
        global.lookups.insert(email.to_string(), entry.clone());
        Ok(entry)
    }

    async fn get_lookup(&self, email: &str) -> TenancyResult<Option<LookupEntry>> {
        Ok(self.global.read().lookups.get(email).cloned())
    }

    async fn delete_lookup(&self, email: &str) -> TenancyResult<bool> {
        Ok(self.global.write().lookups.remove(email).is_some())
    }

    async fn count_lookups(&self, tenant_id: i64) -> TenancyResult<u64> {
        Ok(self
            .global
            .read()
            .lookups
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .count() as u64)
    }

    async fn create_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        ns.assert_safe_charset()?;
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(ns.as_str()) {
            return Err(TenancyError::SchemaAlreadyExists(ns.tenant_id()));
        }
        namespaces.insert(
            ns.as_str().to_string(),
            NamespaceData {
                next_id: 1,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn create_tenant_tables(&self, ns: &NamespaceName) -> TenancyResult<()> {
        if self.fail_next_table_create.swap(false, Ordering::SeqCst) {
            return Err(TenancyError::Storage(
                "injected table-create failure".to_string(),
            ));
        }
        let mut namespaces = self.namespaces.write();
        let data = namespaces
            .get_mut(ns.as_str())
            .ok_or_else(|| TenancyError::SchemaNotFound(ns.tenant_id()))?;
        for table in TENANT_CATALOG.tables() {
            data.tables.entry(table.to_string()).or_default();
        }
        Ok(())
    }

    async fn drop_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        self.namespaces.write().remove(ns.as_str());
        Ok(())
    }

    async fn namespace_exists(&self, ns: &NamespaceName) -> TenancyResult<bool> {
        Ok(self.namespaces.read().contains_key(ns.as_str()))
    }

    async fn open_session(
        &self,
        ns: &NamespaceName,
        timeout: Duration,
    ) -> TenancyResult<Box<dyn TenantSession>> {
        let conn = self.pool.checkout(timeout).await?;
        conn.bind(ns.as_str());
        Ok(Box::new(MemorySession {
            namespace: ns.clone(),
            store: self.namespaces.clone(),
            pool: self.pool.clone(),
            conn: Some(conn),
        }))
    }
}

/// A checked-out connection bound to one namespace.
struct MemorySession {
    namespace: NamespaceName,
    store: Arc<RwLock<HashMap<String, NamespaceData>>>,
    pool: Arc<MemoryPool>,
    conn: Option<PooledConn>,
}

impl MemorySession {
    fn table_key(&self, table: &str) -> TenancyResult<String> {
        if !TENANT_CATALOG.contains(table) {
            return Err(TenancyError::UnknownTable(table.to_string()));
        }
        Ok(table.to_string())
    }

    fn active_namespace(&self) -> TenancyResult<String> {
        self.conn
            .as_ref()
            .and_then(|c| c.active_namespace())
            .ok_or_else(|| TenancyError::Storage("session already released".to_string()))
    }

    /// Run `f` against this session's namespace tables.
    fn with_namespace<T>(
        &self,
        f: impl FnOnce(&mut NamespaceData) -> TenancyResult<T>,
    ) -> TenancyResult<T> {
        let key = self.active_namespace()?;
        let mut store = self.store.write();
        let data = store
            .get_mut(&key)
            .ok_or_else(|| TenancyError::SchemaNotFound(self.namespace.tenant_id()))?;
        f(data)
    }

    /// Reset the connection and put the slot back on the free list.
    fn close_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.reset();
            self.pool.repool(&conn);
            conn.release_permit();
        }
    }
}

#[async_trait]
impl TenantSession for MemorySession {
    fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    async fn insert(&mut self, table: &str, mut doc: Value) -> TenancyResult<Value> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            let id = data.next_id;
            data.next_id += 1;
            if let Some(map) = doc.as_object_mut() {
                map.insert("id".to_string(), json!(id));
            } else {
                return Err(TenancyError::Storage(
                    "document must be a JSON object".to_string(),
                ));
            }
            let rows = data
                .tables
                .get_mut(&table)
                .ok_or_else(|| TenancyError::UnknownTable(table.clone()))?;
            rows.insert(id, doc.clone());
            Ok(doc)
        })
    }

    async fn get(&mut self, table: &str, id: i64) -> TenancyResult<Option<Value>> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            Ok(data
                .tables
                .get(&table)
                .and_then(|rows| rows.get(&id))
                .cloned())
        })
    }

    async fn find_by(
        &mut self,
        table: &str,
        field: &str,
        value: &str,
    ) -> TenancyResult<Option<Value>> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            Ok(data.tables.get(&table).and_then(|rows| {
                rows.values()
                    .find(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
                    .cloned()
            }))
        })
    }

    async fn list(&mut self, table: &str) -> TenancyResult<Vec<Value>> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            Ok(data
                .tables
                .get(&table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    async fn update(&mut self, table: &str, id: i64, mut doc: Value) -> TenancyResult<Option<Value>> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            let rows = data
                .tables
                .get_mut(&table)
                .ok_or_else(|| TenancyError::UnknownTable(table.clone()))?;
            if !rows.contains_key(&id) {
                return Ok(None);
            }
            if let Some(map) = doc.as_object_mut() {
                map.insert("id".to_string(), json!(id));
            }
            rows.insert(id, doc.clone());
            Ok(Some(doc))
        })
    }

    async fn delete(&mut self, table: &str, id: i64) -> TenancyResult<bool> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            Ok(data
                .tables
                .get_mut(&table)
                .map(|rows| rows.remove(&id).is_some())
                .unwrap_or(false))
        })
    }

    async fn count(&mut self, table: &str) -> TenancyResult<u64> {
        let table = self.table_key(table)?;
        self.with_namespace(|data| {
            Ok(data
                .tables
                .get(&table)
                .map(|rows| rows.len() as u64)
                .unwrap_or(0))
        })
    }

    async fn release(mut self: Box<Self>) -> TenancyResult<()> {
        self.close_connection();
        Ok(())
    }

    fn discard(&mut self) {
        // Reset is synchronous for the in-memory pool, so the drop path
        // gives the same guarantee as an explicit release.
        self.close_connection();
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close_connection();
    }
}
