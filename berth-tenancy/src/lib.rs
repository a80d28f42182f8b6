//! # berth-tenancy: schema-per-tenant isolation
//!
//! Every tenant (company) gets an independently namespaced region of one
//! shared relational store, and every authenticated request is routed
//! into the right namespace through a pooled connection that is reset
//! before it can ever be reused.
//!
//! The pieces, leaf-first:
//!
//! - [`namespace::NamespaceResolver`] turns an already-typed tenant id
//!   into a canonical, injection-safe namespace name
//! - [`seed::ReferenceDataSeeder`] stamps the default reference catalog
//!   into a fresh namespace
//! - [`lifecycle::SchemaLifecycle`] creates/destroys namespaces with
//!   compensating cleanup for partial failures
//! - [`lookup::TenantLookupService`] maps a login identity to its tenant
//!   before any namespace is known
//! - [`router::SessionRouter`] opens [`router::ScopedSession`]s bound to
//!   a tenant, with reset-before-return guaranteed on every exit path
//! - [`engine::TenancyEngine`] wires it all over one [`backend::StorageBackend`]
//!
//! The in-memory backend (default feature `memory`) is used by every test
//! and models the same pool semantics as the PostgreSQL backend behind
//! the `postgres` feature.
//!
//! ```rust
//! use std::sync::Arc;
//! use berth_tenancy::{MemoryBackend, TenancyEngine, TenancyOptions};
//!
//! # async fn demo() -> Result<(), berth_tenancy::TenancyError> {
//! let backend = Arc::new(MemoryBackend::new());
//! let engine = TenancyEngine::new(backend, TenancyOptions::default())?;
//!
//! let company = engine.lifecycle().provision("Acme").await?;
//! let mut session = engine.router().acquire(company.id).await?;
//! let providers = session.list("cloud_providers").await?;
//! session.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod lookup;
pub mod namespace;
pub mod options;
pub mod router;
pub mod seed;

#[cfg(feature = "memory")]
pub use backend::memory::MemoryBackend;
pub use backend::{Company, LookupEntry, StorageBackend, TenantSession};
pub use engine::TenancyEngine;
pub use error::{TenancyError, TenancyResult};
pub use lifecycle::SchemaLifecycle;
pub use lookup::TenantLookupService;
pub use namespace::{NamespaceName, NamespaceResolver};
pub use options::TenancyOptions;
pub use router::{NamespaceCache, ScopedSession, SessionRouter};
pub use seed::{ReferenceCatalog, ReferenceDataSeeder, ServiceTypeDef};

#[cfg(feature = "postgres")]
pub use backend::postgres::PostgresBackend;
