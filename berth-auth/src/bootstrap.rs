//! First-company bootstrap.
//!
//! Provisions a company with its tenant namespace and registers the
//! founding admin in one call. If the admin cannot be registered (most
//! commonly an email already claimed by another tenant) the freshly
//! provisioned tenant is torn down again, so a failed bootstrap leaves
//! no company behind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use berth_tenancy::{Company, SchemaLifecycle};

use crate::error::AuthResult;
use crate::registration::{NewUser, RegistrationService};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapOutcome {
    pub company: Company,
    pub admin: Value,
}

#[derive(Clone)]
pub struct BootstrapService {
    lifecycle: SchemaLifecycle,
    registration: RegistrationService,
}

impl BootstrapService {
    pub fn new(lifecycle: SchemaLifecycle, registration: RegistrationService) -> Self {
        Self {
            lifecycle,
            registration,
        }
    }

    pub async fn bootstrap_company(
        &self,
        company_name: &str,
        mut admin: NewUser,
    ) -> AuthResult<BootstrapOutcome> {
        admin.role = "admin".to_string();

        let company = self.lifecycle.provision(company_name).await?;
        let registered = match self.registration.register_user(company.id, admin).await {
            Ok(row) => row,
            Err(e) => {
                // Compensate: the namespace was only created for this admin.
                if let Err(teardown) = self.lifecycle.destroy(company.id).await {
                    tracing::error!(
                        company_id = company.id,
                        error = %teardown,
                        "failed to tear down company after bootstrap failure"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(company_id = company.id, name = company_name, "company bootstrapped");
        Ok(BootstrapOutcome {
            company,
            admin: registered,
        })
    }
}
