//! User registration.
//!
//! A registered user is two writes in two stores: the user row inside the
//! tenant's namespace and the global email-to-tenant mapping that login
//! resolves through. The mapping is written last; if it collides with an
//! email registered under any tenant, the user row is compensated away so
//! the two stores stay consistent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use berth_tenancy::{ScopedSession, SessionRouter, TenancyError, TenantLookupService};

use crate::error::{AuthError, AuthResult};
use crate::password;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "member".to_string()
}

#[derive(Clone)]
pub struct RegistrationService {
    lookup: TenantLookupService,
    router: SessionRouter,
}

impl RegistrationService {
    pub fn new(lookup: TenantLookupService, router: SessionRouter) -> Self {
        Self { lookup, router }
    }

    /// Create a user inside the tenant's namespace and register its email
    /// in the global lookup. Returns the stored user row without the hash.
    pub async fn register_user(&self, tenant_id: i64, new_user: NewUser) -> AuthResult<Value> {
        let mut session = self.router.acquire(tenant_id).await?;
        let outcome = self.insert_user(&mut session, tenant_id, &new_user).await;
        session.release().await?;
        outcome
    }

    async fn insert_user(
        &self,
        session: &mut ScopedSession,
        tenant_id: i64,
        new_user: &NewUser,
    ) -> AuthResult<Value> {
        // Per-tenant check first: a duplicate inside this namespace never
        // needs the global mapping touched at all.
        if session
            .find_by("users", "email", &new_user.email)
            .await?
            .is_some()
        {
            return Err(AuthError::UserAlreadyExists(new_user.email.clone()));
        }

        let password_hash = password::hash_password(&new_user.password)?;
        let row = session
            .insert(
                "users",
                json!({
                    "name": new_user.name,
                    "email": new_user.email,
                    "password_hash": password_hash,
                    "role": new_user.role,
                    "is_active": true,
                }),
            )
            .await?;

        match self.lookup.register(&new_user.email, tenant_id).await {
            Ok(_) => {}
            // Email taken in another tenant: roll the user row back.
            Err(TenancyError::DuplicateIdentity(email)) => {
                if let Some(id) = row.get("id").and_then(Value::as_i64) {
                    session.delete("users", id).await?;
                }
                return Err(AuthError::UserAlreadyExists(email));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(tenant_id, email = %new_user.email, "user registered");
        Ok(strip_password_hash(row))
    }

    /// Delete a user and its lookup entry. Returns false if no user with
    /// that email exists in the tenant.
    pub async fn remove_user(&self, tenant_id: i64, email: &str) -> AuthResult<bool> {
        let mut session = self.router.acquire(tenant_id).await?;
        let found = session.find_by("users", "email", email).await;
        let removed = match found {
            Ok(Some(row)) => {
                let mut removed = false;
                if let Some(id) = row.get("id").and_then(Value::as_i64) {
                    removed = match session.delete("users", id).await {
                        Ok(r) => r,
                        Err(e) => {
                            session.release().await?;
                            return Err(e.into());
                        }
                    };
                }
                removed
            }
            Ok(None) => false,
            Err(e) => {
                session.release().await?;
                return Err(e.into());
            }
        };
        session.release().await?;

        if removed {
            self.lookup.remove(email).await?;
            tracing::info!(tenant_id, email, "user removed");
        }
        Ok(removed)
    }
}

fn strip_password_hash(mut row: Value) -> Value {
    if let Value::Object(ref mut map) = row {
        map.remove("password_hash");
    }
    row
}
