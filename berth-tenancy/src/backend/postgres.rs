//! PostgreSQL backend: one schema per tenant.
//!
//! Namespace names reach this module only as validated [`NamespaceName`]s
//! built from a fixed template over an integer, and the charset assertion
//! runs again before any DDL interpolates one. Tenant tables are JSONB
//! document tables; the generic CRUD layer above never builds SQL itself.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};

use berth_core::catalog::TENANT_CATALOG;

use crate::backend::{Company, LookupEntry, StorageBackend, TenantSession};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::NamespaceName;

const DUPLICATE_SCHEMA: &str = "42P06";
const UNIQUE_VIOLATION: &str = "23505";

fn db_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|d| d.code().map(|c| c.to_string()))
}

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect and ensure the shared-namespace tables exist.
    pub async fn connect(url: &str, max_connections: u32) -> TenancyResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(TenancyError::storage)?;

        sqlx::raw_sql(
            r#"CREATE TABLE IF NOT EXISTS public.companies (
                id         BIGSERIAL PRIMARY KEY,
                name       TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS public.user_company_lookup (
                email      TEXT PRIMARY KEY,
                tenant_id  BIGINT NOT NULL REFERENCES public.companies(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS user_company_lookup_tenant_idx
                ON public.user_company_lookup(tenant_id)"#,
        )
        .execute(&pool)
        .await
        .map_err(TenancyError::storage)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_company(row: &sqlx::postgres::PgRow) -> TenancyResult<Company> {
        Ok(Company {
            id: row.try_get("id").map_err(TenancyError::storage)?,
            name: row.try_get("name").map_err(TenancyError::storage)?,
            created_at: row.try_get("created_at").map_err(TenancyError::storage)?,
        })
    }

    fn row_to_lookup(row: &sqlx::postgres::PgRow) -> TenancyResult<LookupEntry> {
        Ok(LookupEntry {
            email: row.try_get("email").map_err(TenancyError::storage)?,
            tenant_id: row.try_get("tenant_id").map_err(TenancyError::storage)?,
            created_at: row.try_get("created_at").map_err(TenancyError::storage)?,
        })
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn insert_company(&self, name: &str) -> TenancyResult<Company> {
        let row = sqlx::query(
            "INSERT INTO public.companies (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(TenancyError::storage)?;
        Self::row_to_company(&row)
    }

    async fn get_company(&self, id: i64) -> TenancyResult<Option<Company>> {
        let row = sqlx::query("SELECT id, name, created_at FROM public.companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        row.as_ref().map(Self::row_to_company).transpose()
    }

    async fn delete_company(&self, id: i64) -> TenancyResult<bool> {
        let result = sqlx::query("DELETE FROM public.companies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_companies(&self) -> TenancyResult<Vec<Company>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM public.companies ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        rows.iter().map(Self::row_to_company).collect()
    }

    async fn insert_lookup(&self, email: &str, tenant_id: i64) -> TenancyResult<LookupEntry> {
        let row = sqlx::query(
            "INSERT INTO public.user_company_lookup (email, tenant_id)
             VALUES ($1, $2) RETURNING email, tenant_id, created_at",
        )
        .bind(email)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match db_code(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => TenancyError::DuplicateIdentity(email.to_string()),
            _ => TenancyError::storage(e),
        })?;
        Self::row_to_lookup(&row)
    }

    async fn get_lookup(&self, email: &str) -> TenancyResult<Option<LookupEntry>> {
        let row = sqlx::query(
            "SELECT email, tenant_id, created_at FROM public.user_company_lookup WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(TenancyError::storage)?;
        row.as_ref().map(Self::row_to_lookup).transpose()
    }

    async fn delete_lookup(&self, email: &str) -> TenancyResult<bool> {
        let result = sqlx::query("DELETE FROM public.user_company_lookup WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_lookups(&self, tenant_id: i64) -> TenancyResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM public.user_company_lookup WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(TenancyError::storage)?;
        Ok(count as u64)
    }

    async fn create_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        ns.assert_safe_charset()?;
        // Deliberately no IF NOT EXISTS: the duplicate-schema error is the
        // uniqueness tie-break for racing creates.
        sqlx::raw_sql(&format!("CREATE SCHEMA \"{ns}\""))
            .execute(&self.pool)
            .await
            .map_err(|e| match db_code(&e).as_deref() {
                Some(DUPLICATE_SCHEMA) => TenancyError::SchemaAlreadyExists(ns.tenant_id()),
                _ => TenancyError::storage(e),
            })?;
        Ok(())
    }

    async fn create_tenant_tables(&self, ns: &NamespaceName) -> TenancyResult<()> {
        ns.assert_safe_charset()?;
        for table in TENANT_CATALOG.tables() {
            sqlx::raw_sql(&format!(
                r#"CREATE TABLE "{ns}"."{table}" (
                    id  BIGSERIAL PRIMARY KEY,
                    doc JSONB NOT NULL
                )"#
            ))
            .execute(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        }
        // Login reads users by email on every authentication.
        sqlx::raw_sql(&format!(
            r#"CREATE INDEX "users_email_idx_{id}" ON "{ns}".users ((doc->>'email'))"#,
            id = ns.tenant_id()
        ))
        .execute(&self.pool)
        .await
        .map_err(TenancyError::storage)?;
        Ok(())
    }

    async fn drop_namespace(&self, ns: &NamespaceName) -> TenancyResult<()> {
        ns.assert_safe_charset()?;
        sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS \"{ns}\" CASCADE"))
            .execute(&self.pool)
            .await
            .map_err(TenancyError::storage)?;
        Ok(())
    }

    async fn namespace_exists(&self, ns: &NamespaceName) -> TenancyResult<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
        )
        .bind(ns.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(TenancyError::storage)?;
        Ok(found.is_some())
    }

    async fn open_session(
        &self,
        ns: &NamespaceName,
        timeout: Duration,
    ) -> TenancyResult<Box<dyn TenantSession>> {
        ns.assert_safe_charset()?;
        let mut conn = tokio::time::timeout(timeout, self.pool.acquire())
            .await
            .map_err(|_| TenancyError::AcquireTimeout)?
            .map_err(TenancyError::storage)?;

        sqlx::raw_sql(&format!("SET search_path TO \"{ns}\""))
            .execute(&mut *conn)
            .await
            .map_err(TenancyError::storage)?;

        Ok(Box::new(PgSession {
            namespace: ns.clone(),
            conn: Some(conn),
        }))
    }
}

/// A checked-out pooled connection with its search path bound to one
/// tenant schema.
struct PgSession {
    namespace: NamespaceName,
    conn: Option<PoolConnection<Postgres>>,
}

impl PgSession {
    fn conn(&mut self) -> TenancyResult<&mut PoolConnection<Postgres>> {
        self.conn
            .as_mut()
            .ok_or_else(|| TenancyError::Storage("session already released".to_string()))
    }

    fn table<'a>(&self, table: &'a str) -> TenancyResult<&'a str> {
        // The catalog is the allow-list; only its static names are ever
        // interpolated into statements.
        if TENANT_CATALOG.contains(table) {
            Ok(table)
        } else {
            Err(TenancyError::UnknownTable(table.to_string()))
        }
    }
}

#[async_trait]
impl TenantSession for PgSession {
    fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    async fn insert(&mut self, table: &str, doc: Value) -> TenancyResult<Value> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let row = sqlx::query(&format!(
            r#"INSERT INTO "{table}" (doc) VALUES ($1)
               RETURNING doc || jsonb_build_object('id', id) AS doc"#
        ))
        .bind(sqlx::types::Json(doc))
        .fetch_one(&mut **conn)
        .await
        .map_err(TenancyError::storage)?;
        let stored: sqlx::types::Json<Value> =
            row.try_get("doc").map_err(TenancyError::storage)?;
        Ok(stored.0)
    }

    async fn get(&mut self, table: &str, id: i64) -> TenancyResult<Option<Value>> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let doc: Option<sqlx::types::Json<Value>> = sqlx::query_scalar(&format!(
            r#"SELECT doc || jsonb_build_object('id', id) FROM "{table}" WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&mut **conn)
        .await
        .map_err(TenancyError::storage)?;
        Ok(doc.map(|d| d.0))
    }

    async fn find_by(
        &mut self,
        table: &str,
        field: &str,
        value: &str,
    ) -> TenancyResult<Option<Value>> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let doc: Option<sqlx::types::Json<Value>> = sqlx::query_scalar(&format!(
            r#"SELECT doc || jsonb_build_object('id', id)
               FROM "{table}" WHERE doc->>$1 = $2 LIMIT 1"#
        ))
        .bind(field)
        .bind(value)
        .fetch_optional(&mut **conn)
        .await
        .map_err(TenancyError::storage)?;
        Ok(doc.map(|d| d.0))
    }

    async fn list(&mut self, table: &str) -> TenancyResult<Vec<Value>> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let docs: Vec<sqlx::types::Json<Value>> = sqlx::query_scalar(&format!(
            r#"SELECT doc || jsonb_build_object('id', id) FROM "{table}" ORDER BY id"#
        ))
        .fetch_all(&mut **conn)
        .await
        .map_err(TenancyError::storage)?;
        Ok(docs.into_iter().map(|d| d.0).collect())
    }

    async fn update(&mut self, table: &str, id: i64, doc: Value) -> TenancyResult<Option<Value>> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let updated: Option<sqlx::types::Json<Value>> = sqlx::query_scalar(&format!(
            r#"UPDATE "{table}" SET doc = $2 WHERE id = $1
               RETURNING doc || jsonb_build_object('id', id)"#
        ))
        .bind(id)
        .bind(sqlx::types::Json(doc))
        .fetch_optional(&mut **conn)
        .await
        .map_err(TenancyError::storage)?;
        Ok(updated.map(|d| d.0))
    }

    async fn delete(&mut self, table: &str, id: i64) -> TenancyResult<bool> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let result = sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE id = $1"#))
            .bind(id)
            .execute(&mut **conn)
            .await
            .map_err(TenancyError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&mut self, table: &str) -> TenancyResult<u64> {
        let table = self.table(table)?;
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{table}""#))
            .fetch_one(&mut **conn)
            .await
            .map_err(TenancyError::storage)?;
        Ok(count as u64)
    }

    async fn release(mut self: Box<Self>) -> TenancyResult<()> {
        if let Some(mut conn) = self.conn.take() {
            match sqlx::raw_sql("SET search_path TO public")
                .execute(&mut *conn)
                .await
            {
                // Dropping the connection now returns it to the pool clean.
                Ok(_) => {}
                // If the reset itself failed the connection must not be
                // repooled; close it instead.
                Err(e) => {
                    drop(conn.detach());
                    return Err(TenancyError::storage(e));
                }
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        // A reset needs a round trip we cannot await here, so the
        // connection is detached from the pool and closed instead of
        // repooled. A dirty connection never re-enters the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        self.discard();
    }
}
