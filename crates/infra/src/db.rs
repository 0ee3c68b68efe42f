//! Postgres connection pool and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../migrations/0001_core.sql");

/// Advisory lock key serializing schema bootstrap across processes.
const SCHEMA_LOCK_KEY: i64 = 0x7265_6e74_6465_736b;

/// Postgres SQLSTATE codes the adapters branch on.
pub(crate) mod codes {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
}

/// Open a connection pool using the configured limits.
pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(url)
        .await?;
    info!(max_connections = config.max_connections, "postgres pool ready");
    Ok(pool)
}

/// Create the ledger and rental tables if they do not exist yet.
///
/// Runs under a transaction-scoped advisory lock: concurrent
/// `CREATE ... IF NOT EXISTS` can still collide on the catalog otherwise.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// SQLSTATE of a database error, if the error came from the server.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Errors a caller can reasonably retry: lost connections, pool exhaustion,
/// serialization failures.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(_) => matches!(
            sqlstate(err).as_deref(),
            Some(codes::SERIALIZATION_FAILURE) | Some(codes::DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}
