//! berth-core: shared tenant-identity types and table catalogs for Berth.
//!
//! This crate is deliberately I/O-free. It defines the tenant context that
//! every request carries and the two disjoint table registries (global vs
//! tenant) that the storage layer builds its namespaces from.

pub mod catalog;
pub mod tenant;

pub use catalog::{Catalog, GLOBAL_CATALOG, TENANT_CATALOG};
pub use tenant::{TenantContext, TenantId};
