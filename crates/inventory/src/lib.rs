//! Inventory domain module.
//!
//! This crate contains the business rules for stock consumption by work orders,
//! implemented as deterministic domain logic (no IO, no HTTP, no storage). Store
//! adapters in `rentdesk-infra` route every stock mutation through [`movement`].

pub mod item;
pub mod movement;

pub use item::{InventoryItem, UsageLine, UsageRecord};
pub use movement::{StockError, StockMovement, plan_allocation, plan_release, plan_resize};
