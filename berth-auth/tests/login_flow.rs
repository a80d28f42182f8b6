use std::sync::Arc;

use berth_auth::{
    AuthError, AuthOptions, BootstrapService, LoginService, NewUser, RegistrationService,
    TokenIssuer,
};
use berth_tenancy::{
    MemoryBackend, NamespaceResolver, StorageBackend, TenancyEngine, TenancyOptions,
};

struct Harness {
    backend: Arc<MemoryBackend>,
    engine: TenancyEngine,
    login: LoginService,
    registration: RegistrationService,
    bootstrap: BootstrapService,
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let engine = TenancyEngine::new(backend.clone(), TenancyOptions::default()).unwrap();
    let issuer = TokenIssuer::new(AuthOptions::new("test-signing-secret")).unwrap();
    let registration =
        RegistrationService::new(engine.lookup().clone(), engine.router().clone());
    let bootstrap = BootstrapService::new(engine.lifecycle().clone(), registration.clone());
    let login = LoginService::new(engine.lookup().clone(), engine.router().clone(), issuer);
    Harness {
        backend,
        engine,
        login,
        registration,
        bootstrap,
    }
}

fn admin(email: &str) -> NewUser {
    NewUser {
        name: "Admin".to_string(),
        email: email.to_string(),
        password: "correct horse battery staple".to_string(),
        role: "admin".to_string(),
    }
}

#[tokio::test]
async fn test_bootstrap_login_authorize() {
    let h = harness();
    let outcome = h
        .bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();
    assert_eq!(outcome.admin["role"], "admin");
    assert!(outcome.admin.get("password_hash").is_none());

    let token = h
        .login
        .login("alice@acme.example", "correct horse battery staple")
        .await
        .unwrap();
    assert_eq!(token.token_type, "bearer");

    let ctx = h.login.authorize(&token.access_token).unwrap();
    assert_eq!(ctx.tenant_id(), outcome.company.id);
    assert_eq!(ctx.subject, "alice@acme.example");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_identical() {
    let h = harness();
    h.bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();

    let wrong_password = h
        .login
        .login("alice@acme.example", "not-the-password")
        .await
        .unwrap_err();
    let unknown_email = h
        .login
        .login("nobody@acme.example", "correct horse battery staple")
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, AuthError::AuthenticationFailed));
    assert!(matches!(unknown_email, AuthError::AuthenticationFailed));
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
}

#[tokio::test]
async fn test_stale_lookup_mapping_is_a_credential_failure() {
    let h = harness();
    let outcome = h
        .bootstrap
        .bootstrap_company("Doomed", admin("alice@doomed.example"))
        .await
        .unwrap();

    // Drop the namespace out from under the lookup entry.
    let ns = NamespaceResolver::default()
        .resolve(outcome.company.id)
        .unwrap();
    h.backend.drop_namespace(&ns).await.unwrap();

    let err = h
        .login
        .login("alice@doomed.example", "correct horse battery staple")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));
}

#[tokio::test]
async fn test_inactive_account_is_named() {
    let h = harness();
    let outcome = h
        .bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();

    // Deactivate the user in place.
    let mut session = h.engine.router().acquire(outcome.company.id).await.unwrap();
    let mut user = session
        .find_by("users", "email", "alice@acme.example")
        .await
        .unwrap()
        .unwrap();
    let id = user["id"].as_i64().unwrap();
    user["is_active"] = serde_json::json!(false);
    session.update("users", id, user).await.unwrap();
    session.release().await.unwrap();

    let err = h
        .login
        .login("alice@acme.example", "correct horse battery staple")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InactiveAccount));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_email_is_unique_across_tenants_with_compensation() {
    let h = harness();
    let first = h
        .bootstrap
        .bootstrap_company("First", admin("shared@example.com"))
        .await
        .unwrap();
    let second = h
        .bootstrap
        .bootstrap_company("Second", admin("other@example.com"))
        .await
        .unwrap();

    let err = h
        .registration
        .register_user(second.company.id, admin("shared@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists(_)));

    // The colliding row was compensated away in the second tenant.
    let mut session = h.engine.router().acquire(second.company.id).await.unwrap();
    assert!(session
        .find_by("users", "email", "shared@example.com")
        .await
        .unwrap()
        .is_none());
    session.release().await.unwrap();

    // And login still resolves to the original tenant.
    let token = h
        .login
        .login("shared@example.com", "correct horse battery staple")
        .await
        .unwrap();
    let ctx = h.login.authorize(&token.access_token).unwrap();
    assert_eq!(ctx.tenant_id(), first.company.id);
}

#[tokio::test]
async fn test_failed_bootstrap_tears_the_company_down() {
    let h = harness();
    h.bootstrap
        .bootstrap_company("First", admin("shared@example.com"))
        .await
        .unwrap();

    // Same admin email: registration collides, bootstrap compensates.
    let err = h
        .bootstrap
        .bootstrap_company("Second", admin("shared@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists(_)));

    let companies = h.backend.list_companies().await.unwrap();
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].name, "First");
}

#[tokio::test]
async fn test_tampered_token_is_rejected() {
    let h = harness();
    h.bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();
    let token = h
        .login
        .login("alice@acme.example", "correct horse battery staple")
        .await
        .unwrap();

    let mut tampered = token.access_token.clone();
    tampered.replace_range(..1, "x");
    assert!(matches!(
        h.login.authorize(&tampered),
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        h.login.authorize("not-a-token"),
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn test_duplicate_within_tenant_is_rejected_before_any_write() {
    let h = harness();
    let outcome = h
        .bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();

    let err = h
        .registration
        .register_user(outcome.company.id, admin("alice@acme.example"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists(_)));

    let mut session = h.engine.router().acquire(outcome.company.id).await.unwrap();
    assert_eq!(session.count("users").await.unwrap(), 1);
    session.release().await.unwrap();
}

#[tokio::test]
async fn test_remove_user_clears_the_lookup() {
    let h = harness();
    let outcome = h
        .bootstrap
        .bootstrap_company("Acme", admin("alice@acme.example"))
        .await
        .unwrap();

    assert!(h
        .registration
        .remove_user(outcome.company.id, "alice@acme.example")
        .await
        .unwrap());

    let err = h
        .login
        .login("alice@acme.example", "correct horse battery staple")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));

    // The tenant is now empty and can be destroyed.
    h.engine
        .lifecycle()
        .destroy(outcome.company.id)
        .await
        .unwrap();
}
