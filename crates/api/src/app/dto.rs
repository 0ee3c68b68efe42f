use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rentdesk_core::WorkOrderId;
use rentdesk_inventory::UsageLine;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub inventory_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub quantity: i64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WorkOrderInventoryResponse {
    pub work_order_id: WorkOrderId,
    pub lines: Vec<UsageLine>,
    pub total_value: Decimal,
}

impl WorkOrderInventoryResponse {
    pub fn new(work_order_id: WorkOrderId, lines: Vec<UsageLine>) -> Self {
        let total_value = lines.iter().map(UsageLine::line_total).sum();
        Self {
            work_order_id,
            lines,
            total_value,
        }
    }
}
