use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use berth_tenancy::{
    Company, LookupEntry, MemoryBackend, NamespaceName, StorageBackend, TenancyEngine,
    TenancyError, TenancyOptions, TenancyResult, TenantSession,
};

/// Test factory functions
fn engine_with(backend: Arc<MemoryBackend>) -> TenancyEngine {
    TenancyEngine::new(backend, TenancyOptions::default()).unwrap()
}

fn default_engine() -> (Arc<MemoryBackend>, TenancyEngine) {
    let backend = Arc::new(MemoryBackend::new());
    let engine = engine_with(backend.clone());
    (backend, engine)
}

/// T1. Create Then Destroy Leaves Nothing Behind
#[tokio::test]
async fn test_create_destroy_round_trip() {
    let (backend, engine) = default_engine();

    let company = engine.lifecycle().provision("Acme").await.unwrap();
    let ns = berth_tenancy::NamespaceResolver::default()
        .resolve(company.id)
        .unwrap();
    assert!(backend.namespace_exists(&ns).await.unwrap());

    engine.lifecycle().destroy(company.id).await.unwrap();

    assert!(!backend.namespace_exists(&ns).await.unwrap());
    assert!(backend.get_company(company.id).await.unwrap().is_none());
}

/// T2. Concurrent Creates: Exactly One Winner
#[tokio::test]
async fn test_concurrent_create_single_winner() {
    let (backend, engine) = default_engine();
    let company = backend.insert_company("Race Corp").await.unwrap();

    let lifecycle = engine.lifecycle().clone();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let lc = lifecycle.clone();
        let id = company.id;
        handles.push(tokio::spawn(async move { lc.create(id).await }));
    }

    let mut ok = 0;
    let mut already_exists = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(TenancyError::SchemaAlreadyExists(id)) => {
                assert_eq!(id, company.id);
                already_exists += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already_exists, 3);

    // The single namespace is fully usable.
    let mut session = engine.router().acquire(company.id).await.unwrap();
    assert_eq!(session.count("cloud_providers").await.unwrap(), 6);
    session.release().await.unwrap();
}

/// T3. Fresh Namespace Carries The Full Default Catalog And No Business Rows
#[tokio::test]
async fn test_fresh_namespace_is_seeded() {
    let (_backend, engine) = default_engine();
    let company = engine.lifecycle().provision("Seeded Inc").await.unwrap();

    let mut session = engine.router().acquire(company.id).await.unwrap();
    assert_eq!(session.count("cloud_providers").await.unwrap(), 6);
    assert_eq!(session.count("registry_providers").await.unwrap(), 8);
    assert_eq!(session.count("service_types").await.unwrap(), 7);
    assert_eq!(session.count("users").await.unwrap(), 0);
    assert_eq!(session.count("teams").await.unwrap(), 0);

    let aws = session
        .find_by("cloud_providers", "name", "AWS")
        .await
        .unwrap();
    assert!(aws.is_some());
    session.release().await.unwrap();
}

/// T4. Sessions Never See Another Tenant's Rows, Even With Colliding Ids
#[tokio::test]
async fn test_cross_tenant_isolation() {
    let (_backend, engine) = default_engine();
    let a = engine.lifecycle().provision("Tenant A").await.unwrap();
    let b = engine.lifecycle().provision("Tenant B").await.unwrap();

    let mut session_a = engine.router().acquire(a.id).await.unwrap();
    let row_a = session_a
        .insert("teams", json!({ "name": "platform" }))
        .await
        .unwrap();
    let row_a_id = row_a["id"].as_i64().unwrap();
    session_a.release().await.unwrap();

    let mut session_b = engine.router().acquire(b.id).await.unwrap();
    let row_b = session_b
        .insert("teams", json!({ "name": "design" }))
        .await
        .unwrap();
    // Row ids are allocated per namespace, so they collide across tenants.
    assert_eq!(row_b["id"].as_i64().unwrap(), row_a_id);

    // B's session resolves the shared id to B's row only.
    let seen = session_b.get("teams", row_a_id).await.unwrap().unwrap();
    assert_eq!(seen["name"], "design");
    assert!(session_b
        .find_by("teams", "name", "platform")
        .await
        .unwrap()
        .is_none());

    // Deleting in B must not touch A.
    assert!(session_b.delete("teams", row_a_id).await.unwrap());
    session_b.release().await.unwrap();

    let mut session_a = engine.router().acquire(a.id).await.unwrap();
    let still_there = session_a.get("teams", row_a_id).await.unwrap().unwrap();
    assert_eq!(still_there["name"], "platform");
    session_a.release().await.unwrap();
}

/// T5. Destroy Refuses While Identities Still Reference The Tenant
#[tokio::test]
async fn test_destroy_requires_empty_tenant() {
    let (_backend, engine) = default_engine();
    let company = engine.lifecycle().provision("Sticky").await.unwrap();
    engine
        .lookup()
        .register("admin@sticky.example", company.id)
        .await
        .unwrap();

    let err = engine.lifecycle().destroy(company.id).await.unwrap_err();
    assert!(matches!(
        err,
        TenancyError::TenantNotEmpty {
            tenant_id,
            remaining: 1
        } if tenant_id == company.id
    ));

    assert!(engine.lookup().remove("admin@sticky.example").await.unwrap());
    engine.lifecycle().destroy(company.id).await.unwrap();
}

/// T6. Provisioning Failure Compensates And Leaves No Company Row
#[tokio::test]
async fn test_provisioning_failure_compensates() {
    let (backend, engine) = default_engine();

    backend.fail_next_table_create();
    let err = engine.lifecycle().provision("Doomed").await.unwrap_err();
    assert!(matches!(err, TenancyError::ProvisioningFailed { .. }));

    // Neither a half-built namespace nor a company row claiming one.
    assert!(backend.list_companies().await.unwrap().is_empty());
    let ns = berth_tenancy::NamespaceResolver::default().resolve(1).unwrap();
    assert!(!backend.namespace_exists(&ns).await.unwrap());

    // A later attempt starts clean and succeeds.
    let company = engine.lifecycle().provision("Recovered").await.unwrap();
    let mut session = engine.router().acquire(company.id).await.unwrap();
    assert_eq!(session.count("service_types").await.unwrap(), 7);
    session.release().await.unwrap();
}

/// T7. Released Connections Carry Nothing Across Tenants
#[tokio::test]
async fn test_pooled_connection_hygiene() {
    // One connection: every session reuses the same underlying slot.
    let backend = Arc::new(MemoryBackend::with_pool_size(1));
    let engine = engine_with(backend.clone());
    let a = engine.lifecycle().provision("First").await.unwrap();
    let b = engine.lifecycle().provision("Second").await.unwrap();

    let mut session_a = engine.router().acquire(a.id).await.unwrap();
    session_a
        .insert("components", json!({ "name": "marker" }))
        .await
        .unwrap();
    session_a.release().await.unwrap();

    // Same pooled connection, different tenant: the marker is invisible.
    let mut session_b = engine.router().acquire(b.id).await.unwrap();
    assert!(session_b
        .find_by("components", "name", "marker")
        .await
        .unwrap()
        .is_none());
    assert_eq!(session_b.count("components").await.unwrap(), 0);
    session_b.release().await.unwrap();
}

/// T8. Dropping A Session Without Release Still Frees And Resets The Slot
#[tokio::test]
async fn test_dropped_session_resets_connection() {
    let backend = Arc::new(MemoryBackend::with_pool_size(1));
    let engine = engine_with(backend.clone());
    let company = engine.lifecycle().provision("Dropper").await.unwrap();

    {
        let mut session = engine.router().acquire(company.id).await.unwrap();
        session
            .insert("tags", json!({ "name": "left-behind" }))
            .await
            .unwrap();
        // Dropped without release: error/cancellation path.
    }

    // The single slot is available again and namespace-clean.
    let mut session = engine.router().acquire(company.id).await.unwrap();
    assert_eq!(session.count("tags").await.unwrap(), 1);
    session.release().await.unwrap();
}

/// T9. Pool Checkout Honors The Request-Scoped Timeout
#[tokio::test]
async fn test_acquire_timeout() {
    let backend = Arc::new(MemoryBackend::with_pool_size(1));
    let options = TenancyOptions {
        acquire_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let engine = TenancyEngine::new(backend, options).unwrap();
    let company = engine.lifecycle().provision("Busy").await.unwrap();

    let held = engine.router().acquire(company.id).await.unwrap();
    let err = engine.router().acquire(company.id).await.unwrap_err();
    assert!(matches!(err, TenancyError::AcquireTimeout));

    held.release().await.unwrap();
    let again = engine.router().acquire(company.id).await.unwrap();
    again.release().await.unwrap();
}

/// T10. Router Observes Destroy Immediately Through The Cache
#[tokio::test]
async fn test_destroy_invalidates_router_cache() {
    let (_backend, engine) = default_engine();
    let company = engine.lifecycle().provision("Ephemeral").await.unwrap();

    // Warm the existence cache.
    let session = engine.router().acquire(company.id).await.unwrap();
    session.release().await.unwrap();

    engine.lifecycle().destroy(company.id).await.unwrap();

    let err = engine.router().acquire(company.id).await.unwrap_err();
    assert!(matches!(err, TenancyError::SchemaNotFound(id) if id == company.id));
}

/// Delegating backend that can park one namespace-existence read after
/// the underlying value has been observed, so lifecycle operations can be
/// interleaved with an in-flight read.
struct HeldReadBackend {
    inner: Arc<MemoryBackend>,
    hold_next_exists: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl HeldReadBackend {
    fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            hold_next_exists: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        }
    }
}

#[async_trait]
impl StorageBackend for HeldReadBackend {
    async fn insert_company(&self, name: &str) -> TenancyResult<Company> {
        self.inner.insert_company(name).await
    }

    async fn get_company(&self, id: i64) -> TenancyResult<Option<Company>> {
        self.inner.get_company(id).await
    }

    async fn delete_company(&self, id: i64) -> TenancyResult<bool> {
        self.inner.delete_company(id).await
    }

    async fn list_companies(&self) -> TenancyResult<Vec<Company>> {
        self.inner.list_companies().await
    }

    async fn insert_lookup(&self, email: &str, tenant_id: i64) -> TenancyResult<LookupEntry> {
        self.inner.insert_lookup(email, tenant_id).await
    }

    async fn get_lookup(&self, email: &str) -> TenancyResult<Option<LookupEntry>> {
        self.inner.get_lookup(email).await
    }

    async fn delete_lookup(&self, email: &str) -> TenancyResult<bool> {
        self.inner.delete_lookup(email).await
    }

    async fn count_lookups(&self, tenant_id: i64) -> TenancyResult<u64> {
        self.inner.count_lookups(tenant_id).await
    }

    async fn create_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        self.inner.create_namespace(ns).await
    }

    async fn create_tenant_tables(&self, ns: &NamespaceName) -> TenancyResult<()> {
        self.inner.create_tenant_tables(ns).await
    }

    async fn drop_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        self.inner.drop_namespace(ns).await
    }

    async fn namespace_exists(&self, ns: &NamespaceName) -> TenancyResult<bool> {
        let exists = self.inner.namespace_exists(ns).await?;
        if self.hold_next_exists.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.resume.notified().await;
        }
        Ok(exists)
    }

    async fn open_session(
        &self,
        ns: &NamespaceName,
        timeout: Duration,
    ) -> TenancyResult<Box<dyn TenantSession>> {
        self.inner.open_session(ns, timeout).await
    }
}

/// T11. Destroy's Cache Invalidation Wins Over An In-Flight Existence Read
#[tokio::test]
async fn test_destroy_invalidation_wins_over_in_flight_read() {
    let backend = Arc::new(HeldReadBackend::new(Arc::new(MemoryBackend::new())));
    let options = TenancyOptions {
        cache_capacity: 1,
        ..Default::default()
    };
    let engine = Arc::new(TenancyEngine::new(backend.clone(), options).unwrap());

    let a = engine.lifecycle().provision("Held").await.unwrap();
    // Evict A's cache entry so the next acquire takes the read path.
    engine.lifecycle().provision("Evictor").await.unwrap();

    backend.hold_next_exists.store(true, Ordering::SeqCst);
    let racer = {
        let engine = engine.clone();
        let id = a.id;
        tokio::spawn(async move { engine.router().acquire(id).await })
    };

    // The racer has observed the namespace as present and is parked;
    // destroy completes underneath it.
    backend.reached.notified().await;
    engine.lifecycle().destroy(a.id).await.unwrap();
    backend.resume.notify_one();

    // The stale read must not republish the namespace as present, for
    // the racing request or for anyone after it.
    let raced = racer.await.unwrap();
    assert!(matches!(raced, Err(TenancyError::SchemaNotFound(id)) if id == a.id));
    let err = engine.router().acquire(a.id).await.unwrap_err();
    assert!(matches!(err, TenancyError::SchemaNotFound(id) if id == a.id));
}

/// T12. Company Deletion Cascades To Its Lookup Entries
#[tokio::test]
async fn test_company_delete_cascades_lookup_entries() {
    let (backend, engine) = default_engine();
    let company = engine.lifecycle().provision("Cascade").await.unwrap();
    backend
        .insert_lookup("late@example.com", company.id)
        .await
        .unwrap();

    // Direct row delete, the same path destroy finishes with. Entries
    // racing in after the emptiness check must not outlive the company.
    assert!(backend.delete_company(company.id).await.unwrap());

    assert!(backend
        .get_lookup("late@example.com")
        .await
        .unwrap()
        .is_none());
    assert_eq!(backend.count_lookups(company.id).await.unwrap(), 0);
}

/// T13. Invalid Ids Are Rejected Before Any Storage Access
#[tokio::test]
async fn test_router_rejects_invalid_ids() {
    let (_backend, engine) = default_engine();
    for raw in [0, -7, i64::MAX] {
        let err = engine.router().acquire(raw).await.unwrap_err();
        assert!(matches!(err, TenancyError::InvalidTenantIdentifier(id) if id == raw));
    }
}

/// T14. Lifecycle Preconditions Surface Verbatim
#[tokio::test]
async fn test_lifecycle_preconditions() {
    let (backend, engine) = default_engine();

    // No company row yet.
    let err = engine.lifecycle().create(42).await.unwrap_err();
    assert!(matches!(err, TenancyError::CompanyNotFound(42)));

    // No namespace to destroy.
    let company = backend.insert_company("Bare").await.unwrap();
    let err = engine.lifecycle().destroy(company.id).await.unwrap_err();
    assert!(matches!(err, TenancyError::SchemaNotFound(id) if id == company.id));

    // Second create for the same company.
    engine.lifecycle().create(company.id).await.unwrap();
    let err = engine.lifecycle().create(company.id).await.unwrap_err();
    assert!(matches!(err, TenancyError::SchemaAlreadyExists(id) if id == company.id));
}

/// T15. Identity Mapping Invariants
#[tokio::test]
async fn test_lookup_invariants() {
    let (_backend, engine) = default_engine();
    let a = engine.lifecycle().provision("Lookup A").await.unwrap();
    let b = engine.lifecycle().provision("Lookup B").await.unwrap();

    engine
        .lookup()
        .register("user@example.com", a.id)
        .await
        .unwrap();

    // Globally unique across all tenants.
    let err = engine
        .lookup()
        .register("user@example.com", b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::DuplicateIdentity(email) if email == "user@example.com"));

    assert_eq!(
        engine.lookup().resolve_tenant("user@example.com").await.unwrap(),
        a.id
    );
    assert!(matches!(
        engine.lookup().resolve_tenant("ghost@example.com").await,
        Err(TenancyError::LookupNotFound)
    ));

    // An entry may only reference a tenant whose namespace exists.
    let err = engine
        .lookup()
        .register("early@example.com", 999)
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::SchemaNotFound(999)));
}

/// T16. Sessions Only Accept Catalog Tables
#[tokio::test]
async fn test_session_rejects_unknown_tables() {
    let (_backend, engine) = default_engine();
    let company = engine.lifecycle().provision("Strict").await.unwrap();

    let mut session = engine.router().acquire(company.id).await.unwrap();
    let err = session
        .insert("companies", json!({ "name": "sneaky" }))
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::UnknownTable(t) if t == "companies"));

    let err = session.list("pg_tables; DROP TABLE users").await.unwrap_err();
    assert!(matches!(err, TenancyError::UnknownTable(_)));
    session.release().await.unwrap();
}
