//! Tenant-aware authentication for Berth.
//!
//! Builds on `berth-tenancy`: the global email-to-tenant lookup decides
//! which namespace a login is checked against, credentials are verified
//! inside that namespace, and the issued JWT carries the tenant id so
//! every later request routes straight back to it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use berth_auth::{AuthOptions, BootstrapService, LoginService, NewUser, RegistrationService, TokenIssuer};
//! use berth_tenancy::{MemoryBackend, TenancyEngine, TenancyOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TenancyEngine::new(Arc::new(MemoryBackend::new()), TenancyOptions::default())?;
//! let issuer = TokenIssuer::new(AuthOptions::new("signing-secret"))?;
//!
//! let registration = RegistrationService::new(engine.lookup().clone(), engine.router().clone());
//! let bootstrap = BootstrapService::new(engine.lifecycle().clone(), registration.clone());
//! let login = LoginService::new(engine.lookup().clone(), engine.router().clone(), issuer);
//!
//! bootstrap
//!     .bootstrap_company(
//!         "Acme",
//!         NewUser {
//!             name: "Alice".into(),
//!             email: "alice@acme.example".into(),
//!             password: "hunter2".into(),
//!             role: "admin".into(),
//!         },
//!     )
//!     .await?;
//!
//! let token = login.login("alice@acme.example", "hunter2").await?;
//! let ctx = login.authorize(&token.access_token)?;
//! assert_eq!(ctx.subject, "alice@acme.example");
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod error;
pub mod flow;
pub mod options;
pub mod password;
pub mod registration;
pub mod token;

pub use bootstrap::{BootstrapOutcome, BootstrapService};
pub use error::{AuthError, AuthResult};
pub use flow::{IssuedToken, LoginService, LoginState};
pub use options::AuthOptions;
pub use registration::{NewUser, RegistrationService};
pub use token::{extract_bearer_token, Claims, TokenIssuer};
