//! # Namespace resolution
//!
//! Derives a tenant's storage namespace name from an untrusted id.
//!
//! The injection-safety invariant lives here: the input is *already typed*
//! as an integer (never a raw string), the resolver only re-validates the
//! bound, and the output is built from nothing but a fixed template over
//! that integer. The resulting name is structurally incapable of carrying
//! delimiter or statement-terminator characters. Backends still assert the
//! allow-listed charset before issuing DDL as defense in depth.

use crate::error::{TenancyError, TenancyResult};

/// Fixed template prefix for tenant namespaces.
pub const NAMESPACE_PREFIX: &str = "tenant_";

/// Upper bound for tenant ids accepted by the default resolver.
pub const DEFAULT_MAX_TENANT_ID: i64 = 100_000_000;

/// A validated tenant namespace name.
///
/// Only constructible through [`NamespaceResolver::resolve`]; holding one
/// is proof the underlying id passed the bound check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceName {
    tenant_id: i64,
    name: String,
}

impl NamespaceName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    /// Defense-in-depth charset assertion, run by backends immediately
    /// before any DDL that interpolates the name.
    pub fn assert_safe_charset(&self) -> TenancyResult<()> {
        let safe = self
            .name
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_'));
        if safe {
            Ok(())
        } else {
            Err(TenancyError::Storage(format!(
                "namespace name failed charset check: {}",
                self.name
            )))
        }
    }
}

impl std::fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Validates tenant ids and derives canonical namespace names.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceResolver {
    max_tenant_id: i64,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self {
            max_tenant_id: DEFAULT_MAX_TENANT_ID,
        }
    }
}

impl NamespaceResolver {
    pub fn new(max_tenant_id: i64) -> Self {
        Self { max_tenant_id }
    }

    /// Derive the namespace name for a tenant id.
    ///
    /// Deterministic and pure: no storage access happens here, so a
    /// rejected id is rejected before any statement could be issued.
    pub fn resolve(&self, raw_id: i64) -> TenancyResult<NamespaceName> {
        if raw_id < 1 || raw_id > self.max_tenant_id {
            return Err(TenancyError::InvalidTenantIdentifier(raw_id));
        }
        Ok(NamespaceName {
            tenant_id: raw_id,
            name: format!("{NAMESPACE_PREFIX}{raw_id}"),
        })
    }
}
