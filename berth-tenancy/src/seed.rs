//! # Reference data seeding
//!
//! Populates a freshly created namespace with the canonical default
//! catalog. The exact set is configuration, not logic: callers may supply
//! their own [`ReferenceCatalog`], and the default mirrors the product's
//! stock catalog. Seeding runs exactly once, immediately after table
//! creation; re-seeding an existing namespace is not a supported
//! operation (updated defaults go through normal CRUD against the
//! tenant's copy).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::TenancyResult;
use crate::router::ScopedSession;

/// A service-type default record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceTypeDef {
    pub name: String,
    pub description: String,
    pub is_managed: bool,
}

impl ServiceTypeDef {
    fn new(name: &str, description: &str, is_managed: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            is_managed,
        }
    }
}

/// The canonical default reference records for a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceCatalog {
    pub cloud_providers: Vec<String>,
    pub registry_providers: Vec<String>,
    pub service_types: Vec<ServiceTypeDef>,
}

impl Default for ReferenceCatalog {
    fn default() -> Self {
        Self {
            cloud_providers: [
                "AWS",
                "Azure",
                "GCP",
                "On-Premise",
                "DigitalOcean",
                "Oracle Cloud",
            ]
            .map(String::from)
            .to_vec(),
            registry_providers: [
                "DockerHub",
                "AWS ECR",
                "GCP GCR",
                "Azure ACR",
                "GitHub Container Registry",
                "GitLab Container Registry",
                "Harbor",
                "JFrog Artifactory",
            ]
            .map(String::from)
            .to_vec(),
            service_types: vec![
                ServiceTypeDef::new("API", "RESTful API service", true),
                ServiceTypeDef::new("Worker", "Background worker service", true),
                ServiceTypeDef::new("Frontend", "Frontend web application", true),
                ServiceTypeDef::new("Database", "Database service", false),
                ServiceTypeDef::new("Cache", "Caching service (Redis, Memcached)", false),
                ServiceTypeDef::new("Message Queue", "Message queue service (RabbitMQ, Kafka)", false),
                ServiceTypeDef::new("Microservice", "General microservice", true),
            ],
        }
    }
}

/// Seeds the default reference records into a fresh tenant namespace.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataSeeder {
    catalog: ReferenceCatalog,
}

impl ReferenceDataSeeder {
    pub fn new(catalog: ReferenceCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    /// Insert the full default set through the given tenant session.
    pub async fn seed(&self, session: &mut ScopedSession) -> TenancyResult<()> {
        for name in &self.catalog.cloud_providers {
            session
                .insert("cloud_providers", json!({ "name": name }))
                .await?;
        }
        for name in &self.catalog.registry_providers {
            session
                .insert("registry_providers", json!({ "name": name }))
                .await?;
        }
        for st in &self.catalog.service_types {
            session
                .insert(
                    "service_types",
                    json!({
                        "name": st.name,
                        "description": st.description,
                        "is_managed": st.is_managed,
                    }),
                )
                .await?;
        }

        tracing::info!(
            tenant_id = session.tenant_id(),
            cloud_providers = self.catalog.cloud_providers.len(),
            registry_providers = self.catalog.registry_providers.len(),
            service_types = self.catalog.service_types.len(),
            "seeded reference data"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_counts() {
        let catalog = ReferenceCatalog::default();
        assert_eq!(catalog.cloud_providers.len(), 6);
        assert_eq!(catalog.registry_providers.len(), 8);
        assert_eq!(catalog.service_types.len(), 7);
    }

    #[test]
    fn managed_flags_follow_stock_catalog() {
        let catalog = ReferenceCatalog::default();
        let managed: Vec<&str> = catalog
            .service_types
            .iter()
            .filter(|st| st.is_managed)
            .map(|st| st.name.as_str())
            .collect();
        assert_eq!(managed, vec!["API", "Worker", "Frontend", "Microservice"]);
    }
}
