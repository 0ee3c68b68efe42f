//! Postgres-backed rental store.
//!
//! Each lifecycle job is one conditional `UPDATE`. Postgres evaluates the
//! predicate and writes the new status per row under its row lock, so two
//! overlapping sweeps can never both count the same rental.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | RentalStoreError |
//! |------------|-----------------|------------------|
//! | Database (unique / check violation) | `23505`, `23514` | `Conflict` |
//! | Io / Tls / PoolTimedOut / serialization | N/A, `40001` | `TransientStoreFailure` |
//! | Other | any | `TransientStoreFailure` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use rentdesk_core::RentalId;
use rentdesk_rentals::{LifecycleJob, RentalRecord, RentalStatus};

use super::{RentalStore, RentalStoreError};
use crate::db::{self, codes};

#[derive(Debug, Clone)]
pub struct PostgresRentalStore {
    pool: Arc<PgPool>,
}

impl PostgresRentalStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn transition_sql(job: LifecycleJob) -> &'static str {
    match job {
        LifecycleJob::ReservedToActive => {
            "UPDATE rentals SET status = $2, updated_at = $3 \
             WHERE status = $1 AND start_date <= $3"
        }
        LifecycleJob::Overdue => {
            "UPDATE rentals SET status = $2, updated_at = $3 \
             WHERE status = $1 AND due_date < $3"
        }
    }
}

#[async_trait]
impl RentalStore for PostgresRentalStore {
    #[instrument(skip(self), fields(job = %job), err)]
    async fn apply_transition(
        &self,
        job: LifecycleJob,
        now: DateTime<Utc>,
    ) -> Result<u64, RentalStoreError> {
        let result = sqlx::query(transition_sql(job))
            .bind(job.from_status().as_str())
            .bind(job.to_status().as_str())
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_transition", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: RentalId) -> Result<Option<RentalRecord>, RentalStoreError> {
        let row = sqlx::query(
            "SELECT id, status, start_date, due_date, updated_at FROM rentals WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_rental", e))?;

        row.map(|r| RentalRow::from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_rental", e))?
            .map(RentalRecord::try_from)
            .transpose()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RentalStoreError {
    if db::is_transient(&err) {
        return RentalStoreError::TransientStoreFailure(format!("{operation}: {err}"));
    }

    match &err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db::sqlstate(&err).as_deref() {
                Some(codes::UNIQUE_VIOLATION) | Some(codes::CHECK_VIOLATION) => {
                    RentalStoreError::Conflict(msg)
                }
                _ => RentalStoreError::TransientStoreFailure(msg),
            }
        }
        _ => RentalStoreError::TransientStoreFailure(format!("sqlx error in {operation}: {err}")),
    }
}

#[derive(Debug)]
struct RentalRow {
    id: i64,
    status: String,
    start_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RentalRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RentalRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            start_date: row.try_get("start_date")?,
            due_date: row.try_get("due_date")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<RentalRow> for RentalRecord {
    type Error = RentalStoreError;

    fn try_from(row: RentalRow) -> Result<Self, Self::Error> {
        let status: RentalStatus = row.status.parse().map_err(|_| {
            RentalStoreError::Conflict(format!(
                "rental {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        Ok(RentalRecord {
            id: RentalId::new(row.id),
            status,
            start_date: row.start_date,
            due_date: row.due_date,
            updated_at: row.updated_at,
        })
    }
}
