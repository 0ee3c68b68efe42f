//! Inventory consumption ledger.
//!
//! The ledger is the only component allowed to change `inventory.quantity` and
//! `work_order_inventory.quantity`. Every mutation follows the same shape:
//!
//! ```text
//! acquire exclusive hold on the item row
//!   ↓
//! read current stock (and the usage row, if any)
//!   ↓
//! plan the movement (rentdesk_inventory::movement)
//!   ↓
//! write stock + usage row
//!   ↓
//! commit (or roll back everything), release hold
//! ```
//!
//! Operations on different items never contend on the same hold.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use rentdesk_core::{DomainError, InventoryItemId, UsageId, WorkOrderId};
use rentdesk_inventory::{StockError, UsageLine, UsageRecord};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger failure taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Missing or malformed caller input. Never retried automatically.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity (item, usage record, work order) does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Not enough units on the shelf at evaluation time.
    #[error(
        "insufficient stock for item {inventory_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        inventory_id: InventoryItemId,
        requested: i64,
        available: i64,
    },

    /// Constraint violation surfaced by the store (duplicate key, entity in use).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store unreachable, timed out, or a rollback could not be confirmed.
    #[error("transient store failure: {0}")]
    TransientStoreFailure(String),
}

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientStoreFailure(msg.into())
    }

    /// Map a stock-rule violation for a specific item.
    pub fn from_stock(inventory_id: InventoryItemId, err: StockError) -> Self {
        match err {
            StockError::InvalidQuantity(q) => {
                Self::InvalidArgument(format!("quantity must be positive, got {q}"))
            }
            StockError::InsufficientStock {
                requested,
                available,
            } => Self::InsufficientStock {
                inventory_id,
                requested,
                available,
            },
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LedgerError::InvalidArgument(msg)
            }
        }
    }
}

/// Reject non-positive quantities before any hold is taken.
pub(crate) fn ensure_quantity(quantity: i64) -> LedgerResult<i64> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(quantity)
}

/// Allocate / resize / release parts on behalf of work orders.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Claim `quantity` units of an item for a work order.
    async fn allocate(
        &self,
        work_order_id: WorkOrderId,
        inventory_id: InventoryItemId,
        quantity: i64,
    ) -> LedgerResult<UsageRecord>;

    /// Change the quantity of an existing claim.
    async fn resize(&self, usage_id: UsageId, new_quantity: i64) -> LedgerResult<UsageRecord>;

    /// Drop a claim, crediting its units back to the item.
    async fn release(&self, usage_id: UsageId) -> LedgerResult<()>;

    /// All claims held by a work order, joined with item metadata. Non-locking.
    async fn list_by_work_order(&self, work_order_id: WorkOrderId) -> LedgerResult<Vec<UsageLine>>;
}

#[async_trait]
impl<L> InventoryLedger for Arc<L>
where
    L: InventoryLedger + ?Sized,
{
    async fn allocate(
        &self,
        work_order_id: WorkOrderId,
        inventory_id: InventoryItemId,
        quantity: i64,
    ) -> LedgerResult<UsageRecord> {
        (**self).allocate(work_order_id, inventory_id, quantity).await
    }

    async fn resize(&self, usage_id: UsageId, new_quantity: i64) -> LedgerResult<UsageRecord> {
        (**self).resize(usage_id, new_quantity).await
    }

    async fn release(&self, usage_id: UsageId) -> LedgerResult<()> {
        (**self).release(usage_id).await
    }

    async fn list_by_work_order(&self, work_order_id: WorkOrderId) -> LedgerResult<Vec<UsageLine>> {
        (**self).list_by_work_order(work_order_id).await
    }
}
