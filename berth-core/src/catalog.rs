//! # Table catalogs
//!
//! Berth keeps two *independent* table registries: one for the shared
//! (global) namespace and one that is stamped into every tenant namespace.
//! A table belongs to exactly one registry, decided here at the point of
//! declaration. No foreign key may cross the registry boundary, which is
//! why there is no shared base declaration to inherit from.
//!
//! The tenant catalog doubles as the allow-list a scoped session checks
//! table names against before any statement is built.

/// Tables that live once, in the shared namespace.
pub const GLOBAL_TABLES: &[&str] = &["companies", "user_company_lookup"];

/// Tables created inside every tenant namespace: business entities plus
/// the per-tenant copies of the reference tables.
pub const TENANT_TABLES: &[&str] = &[
    "users",
    "teams",
    "cloud_providers",
    "registry_providers",
    "service_types",
    "registries",
    "registry_credentials",
    "components",
    "environments",
    "container_images",
    "versions",
    "tags",
];

/// One of the two table registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    tables: &'static [&'static str],
}

/// The shared-namespace registry.
pub const GLOBAL_CATALOG: Catalog = Catalog {
    tables: GLOBAL_TABLES,
};

/// The per-tenant registry.
pub const TENANT_CATALOG: Catalog = Catalog {
    tables: TENANT_TABLES,
};

impl Catalog {
    pub fn tables(&self) -> &'static [&'static str] {
        self.tables
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_disjoint() {
        for table in GLOBAL_TABLES {
            assert!(
                !TENANT_CATALOG.contains(table),
                "table '{table}' declared in both registries"
            );
        }
    }

    #[test]
    fn tenant_catalog_lookup() {
        assert!(TENANT_CATALOG.contains("users"));
        assert!(TENANT_CATALOG.contains("cloud_providers"));
        assert!(!TENANT_CATALOG.contains("companies"));
        assert!(!TENANT_CATALOG.contains("user_company_lookup"));
    }
}
