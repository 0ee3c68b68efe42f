//! Postgres-backed inventory ledger.
//!
//! Every mutation is a single transaction that takes row locks with
//! `SELECT ... FOR UPDATE` before reading the values it checks:
//!
//! | Operation | Locks (in order) |
//! |-----------|------------------|
//! | allocate  | `inventory[item]` |
//! | resize    | `work_order_inventory[usage]`, `inventory[item]` |
//! | release   | `work_order_inventory[usage]`, `inventory[item]` |
//!
//! No operation ever locks two inventory rows, and the usage row is always
//! locked before its item row, so these transactions cannot deadlock each other.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | LedgerError |
//! |------------|-----------------|-------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (check violation) | `23514` | `InvalidArgument` |
//! | Database (serialization / deadlock) | `40001`, `40P01` | `TransientStoreFailure` |
//! | Io / Tls / PoolTimedOut / PoolClosed | N/A | `TransientStoreFailure` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | any | `TransientStoreFailure` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, error, instrument, warn};

use rentdesk_core::{InventoryItemId, UsageId, WorkOrderId};
use rentdesk_inventory::{UsageLine, UsageRecord, plan_allocation, plan_release, plan_resize};

use super::{InventoryLedger, LedgerError, LedgerResult, ensure_quantity};
use crate::db::{self, codes};

/// Postgres-backed ledger.
///
/// `Send + Sync`; share it behind an `Arc`. Each operation checks out one
/// pooled connection for the lifetime of its transaction.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn begin(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Commit on success, roll back on failure.
///
/// A rollback that cannot be confirmed replaces the original error: the caller
/// must not assume the unit had no effect.
async fn finish<T>(tx: Transaction<'static, Postgres>, result: LedgerResult<T>) -> LedgerResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, original = %err, "ledger rollback failed");
                return Err(LedgerError::transient(format!(
                    "rollback failed after {err}: {rollback_err}"
                )));
            }
            Err(err)
        }
    }
}

/// Lock an item row and return its current stock.
async fn lock_item_stock(
    tx: &mut Transaction<'_, Postgres>,
    inventory_id: InventoryItemId,
) -> LedgerResult<i64> {
    let row = sqlx::query("SELECT quantity FROM inventory WHERE id = $1 FOR UPDATE")
        .bind(inventory_id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?
        .ok_or_else(|| LedgerError::not_found(format!("inventory item {inventory_id}")))?;

    row.try_get::<i64, _>("quantity")
        .map_err(|e| map_sqlx_error("read_item_quantity", e))
}

async fn write_item_stock(
    tx: &mut Transaction<'_, Postgres>,
    inventory_id: InventoryItemId,
    quantity: i64,
) -> LedgerResult<()> {
    sqlx::query("UPDATE inventory SET quantity = $2, updated_at = NOW() WHERE id = $1")
        .bind(inventory_id.get())
        .bind(quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_item_quantity", e))?;
    Ok(())
}

/// Lock a usage row and return it.
async fn lock_usage(
    tx: &mut Transaction<'_, Postgres>,
    usage_id: UsageId,
) -> LedgerResult<UsageRecord> {
    let row = sqlx::query(
        r#"
        SELECT id, work_order_id, inventory_id, quantity, created_at, updated_at
        FROM work_order_inventory
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(usage_id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_usage", e))?
    .ok_or_else(|| LedgerError::not_found(format!("usage record {usage_id}")))?;

    UsageRow::from_row(&row)
        .map(UsageRecord::from)
        .map_err(|e| map_sqlx_error("decode_usage", e))
}

async fn allocate_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    work_order_id: WorkOrderId,
    inventory_id: InventoryItemId,
    quantity: i64,
) -> LedgerResult<UsageRecord> {
    let stock = lock_item_stock(tx, inventory_id).await?;
    let movement =
        plan_allocation(stock, quantity).map_err(|e| LedgerError::from_stock(inventory_id, e))?;

    write_item_stock(tx, inventory_id, movement.stock_after).await?;

    let row = sqlx::query(
        r#"
        INSERT INTO work_order_inventory (work_order_id, inventory_id, quantity)
        VALUES ($1, $2, $3)
        RETURNING id, work_order_id, inventory_id, quantity, created_at, updated_at
        "#,
    )
    .bind(work_order_id.get())
    .bind(inventory_id.get())
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        // The item row is locked by us, so a FK failure can only be the work order.
        if db::sqlstate(&e).as_deref() == Some(codes::FOREIGN_KEY_VIOLATION) {
            LedgerError::not_found(format!("work order {work_order_id}"))
        } else {
            map_sqlx_error("insert_usage", e)
        }
    })?;

    UsageRow::from_row(&row)
        .map(UsageRecord::from)
        .map_err(|e| map_sqlx_error("decode_usage", e))
}

async fn resize_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    usage_id: UsageId,
    new_quantity: i64,
) -> LedgerResult<UsageRecord> {
    let usage = lock_usage(tx, usage_id).await?;
    let stock = lock_item_stock(tx, usage.inventory_id).await?;

    let movement = plan_resize(stock, usage.quantity, new_quantity)
        .map_err(|e| LedgerError::from_stock(usage.inventory_id, e))?;
    if movement.is_noop() {
        return Ok(usage);
    }

    write_item_stock(tx, usage.inventory_id, movement.stock_after).await?;

    let row = sqlx::query(
        r#"
        UPDATE work_order_inventory
        SET quantity = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING id, work_order_id, inventory_id, quantity, created_at, updated_at
        "#,
    )
    .bind(usage_id.get())
    .bind(new_quantity)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_usage", e))?;

    UsageRow::from_row(&row)
        .map(UsageRecord::from)
        .map_err(|e| map_sqlx_error("decode_usage", e))
}

async fn release_in_tx(tx: &mut Transaction<'_, Postgres>, usage_id: UsageId) -> LedgerResult<()> {
    let usage = lock_usage(tx, usage_id).await?;
    let stock = lock_item_stock(tx, usage.inventory_id).await?;

    let movement = plan_release(stock, usage.quantity)
        .map_err(|e| LedgerError::from_stock(usage.inventory_id, e))?;

    write_item_stock(tx, usage.inventory_id, movement.stock_after).await?;

    sqlx::query("DELETE FROM work_order_inventory WHERE id = $1")
        .bind(usage_id.get())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_usage", e))?;

    Ok(())
}

#[async_trait]
impl InventoryLedger for PostgresLedger {
    #[instrument(
        skip(self),
        fields(work_order_id = %work_order_id, inventory_id = %inventory_id),
        err
    )]
    async fn allocate(
        &self,
        work_order_id: WorkOrderId,
        inventory_id: InventoryItemId,
        quantity: i64,
    ) -> LedgerResult<UsageRecord> {
        let work_order_id = work_order_id.ensure_valid()?;
        let inventory_id = inventory_id.ensure_valid()?;
        let quantity = ensure_quantity(quantity)?;

        let mut tx = self.begin().await?;
        let result = allocate_in_tx(&mut tx, work_order_id, inventory_id, quantity).await;
        finish(tx, result).await
    }

    #[instrument(skip(self), fields(usage_id = %usage_id), err)]
    async fn resize(&self, usage_id: UsageId, new_quantity: i64) -> LedgerResult<UsageRecord> {
        let usage_id = usage_id.ensure_valid()?;
        let new_quantity = ensure_quantity(new_quantity)?;

        let mut tx = self.begin().await?;
        let result = resize_in_tx(&mut tx, usage_id, new_quantity).await;
        finish(tx, result).await
    }

    #[instrument(skip(self), fields(usage_id = %usage_id), err)]
    async fn release(&self, usage_id: UsageId) -> LedgerResult<()> {
        let usage_id = usage_id.ensure_valid()?;

        let mut tx = self.begin().await?;
        let result = release_in_tx(&mut tx, usage_id).await;
        finish(tx, result).await
    }

    #[instrument(
        skip(self),
        fields(work_order_id = %work_order_id, line_count = tracing::field::Empty),
        err
    )]
    async fn list_by_work_order(&self, work_order_id: WorkOrderId) -> LedgerResult<Vec<UsageLine>> {
        let rows = sqlx::query(
            r#"
            SELECT
                u.id,
                u.work_order_id,
                u.inventory_id,
                u.quantity,
                u.created_at,
                u.updated_at,
                i.name AS item_name,
                i.unit_price
            FROM work_order_inventory u
            JOIN inventory i ON i.id = u.inventory_id
            WHERE u.work_order_id = $1
            ORDER BY u.id ASC
            "#,
        )
        .bind(work_order_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_by_work_order", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let usage = UsageRow::from_row(&row)
                .map(UsageRecord::from)
                .map_err(|e| map_sqlx_error("decode_usage_line", e))?;
            let item_name: String = row
                .try_get("item_name")
                .map_err(|e| map_sqlx_error("decode_usage_line", e))?;
            let unit_price: Decimal = row
                .try_get("unit_price")
                .map_err(|e| map_sqlx_error("decode_usage_line", e))?;
            lines.push(UsageLine {
                usage,
                item_name,
                unit_price,
            });
        }

        Span::current().record("line_count", lines.len());
        Ok(lines)
    }
}

/// Map SQLx errors to LedgerError.
///
/// Constraint failures carry a fixed message; the server's text names
/// tables and values and is only logged.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    if db::is_transient(&err) {
        return LedgerError::transient(format!("{operation}: {err}"));
    }

    match &err {
        sqlx::Error::Database(db_err) => {
            warn!(operation, detail = db_err.message(), "database rejected ledger write");
            match db::sqlstate(&err).as_deref() {
                Some(codes::UNIQUE_VIOLATION) => {
                    LedgerError::Conflict(format!("duplicate row in {operation}"))
                }
                Some(codes::FOREIGN_KEY_VIOLATION) => {
                    LedgerError::not_found(format!("row referenced by {operation}"))
                }
                Some(codes::CHECK_VIOLATION) => LedgerError::InvalidArgument(
                    "value rejected by store constraint".to_string(),
                ),
                _ => LedgerError::transient(format!("database error in {operation}")),
            }
        }
        sqlx::Error::RowNotFound => LedgerError::not_found(format!("row in {operation}")),
        _ => LedgerError::transient(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct UsageRow {
    id: i64,
    work_order_id: i64,
    inventory_id: i64,
    quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UsageRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UsageRow {
            id: row.try_get("id")?,
            work_order_id: row.try_get("work_order_id")?,
            inventory_id: row.try_get("inventory_id")?,
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        UsageRecord {
            id: UsageId::new(row.id),
            work_order_id: WorkOrderId::new(row.work_order_id),
            inventory_id: InventoryItemId::new(row.inventory_id),
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
