use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentdesk_core::{InventoryItemId, UsageId, WorkOrderId};

/// A stocked part. `quantity` is the number of units currently on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// A claim of `quantity` units of an inventory item held by a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: UsageId,
    pub work_order_id: WorkOrderId,
    pub inventory_id: InventoryItemId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usage record joined with the metadata of the item it draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLine {
    #[serde(flatten)]
    pub usage: UsageRecord,
    pub item_name: String,
    pub unit_price: Decimal,
}

impl UsageLine {
    pub fn new(usage: UsageRecord, item: &InventoryItem) -> Self {
        Self {
            usage,
            item_name: item.name.clone(),
            unit_price: item.unit_price,
        }
    }

    /// Price of the claimed units (`quantity * unit_price`).
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.usage.quantity)
    }
}
