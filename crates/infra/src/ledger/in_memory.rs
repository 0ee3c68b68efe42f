use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use rentdesk_core::{InventoryItemId, UsageId, WorkOrderId};
use rentdesk_inventory::{
    InventoryItem, UsageLine, UsageRecord, plan_allocation, plan_release, plan_resize,
};

use super::{InventoryLedger, LedgerError, LedgerResult, ensure_quantity};

fn poisoned(what: &str) -> LedgerError {
    LedgerError::transient(format!("{what} lock poisoned"))
}

/// In-memory ledger for tests/dev.
///
/// Each item sits behind its own mutex, which plays the role of the row lock:
/// every mutator takes it before reading stock and keeps it until both the
/// usage map and the stock are written. Lock order is always
/// item → usage map, and readers never hold the usage map while waiting on an
/// item.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    items: RwLock<HashMap<InventoryItemId, Arc<Mutex<InventoryItem>>>>,
    usages: RwLock<BTreeMap<UsageId, UsageRecord>>,
    work_orders: RwLock<HashSet<WorkOrderId>>,
    next_usage_id: AtomicI64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            next_usage_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Seed (or replace) an inventory item.
    pub fn insert_item(&self, item: InventoryItem) -> LedgerResult<()> {
        self.items
            .write()
            .map_err(|_| poisoned("items"))?
            .insert(item.id, Arc::new(Mutex::new(item)));
        Ok(())
    }

    /// Make a work order known so usage records may reference it.
    pub fn register_work_order(&self, work_order_id: WorkOrderId) -> LedgerResult<()> {
        self.work_orders
            .write()
            .map_err(|_| poisoned("work orders"))?
            .insert(work_order_id);
        Ok(())
    }

    /// Snapshot of one item (takes its hold briefly).
    pub fn item(&self, inventory_id: InventoryItemId) -> Option<InventoryItem> {
        let slot = self.slot(inventory_id).ok()?;
        let item = slot.lock().ok()?;
        Some(item.clone())
    }

    /// Snapshot of one usage record.
    pub fn usage(&self, usage_id: UsageId) -> Option<UsageRecord> {
        self.usages.read().ok()?.get(&usage_id).cloned()
    }

    fn slot(&self, inventory_id: InventoryItemId) -> LedgerResult<Arc<Mutex<InventoryItem>>> {
        let items = self.items.read().map_err(|_| poisoned("items"))?;
        items
            .get(&inventory_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("inventory item {inventory_id}")))
    }

    fn allocate_sync(
        &self,
        work_order_id: WorkOrderId,
        inventory_id: InventoryItemId,
        quantity: i64,
    ) -> LedgerResult<UsageRecord> {
        let work_order_id = work_order_id.ensure_valid()?;
        let inventory_id = inventory_id.ensure_valid()?;
        let quantity = ensure_quantity(quantity)?;

        let known = self
            .work_orders
            .read()
            .map_err(|_| poisoned("work orders"))?
            .contains(&work_order_id);
        if !known {
            return Err(LedgerError::not_found(format!("work order {work_order_id}")));
        }

        let slot = self.slot(inventory_id)?;
        let mut item = slot.lock().map_err(|_| poisoned("item"))?;

        let movement = plan_allocation(item.quantity, quantity)
            .map_err(|e| LedgerError::from_stock(inventory_id, e))?;

        let now = Utc::now();
        let record = UsageRecord {
            id: UsageId::new(self.next_usage_id.fetch_add(1, Ordering::SeqCst)),
            work_order_id,
            inventory_id,
            quantity,
            created_at: now,
            updated_at: now,
        };

        // The only fallible write comes first; stock is touched last.
        self.usages
            .write()
            .map_err(|_| poisoned("usages"))?
            .insert(record.id, record.clone());
        item.quantity = movement.stock_after;

        debug!(usage_id = %record.id, stock_after = movement.stock_after, "usage allocated");
        Ok(record)
    }

    fn resize_sync(&self, usage_id: UsageId, new_quantity: i64) -> LedgerResult<UsageRecord> {
        let usage_id = usage_id.ensure_valid()?;
        let new_quantity = ensure_quantity(new_quantity)?;

        let inventory_id = self
            .usage_item(usage_id)?
            .ok_or_else(|| LedgerError::not_found(format!("usage record {usage_id}")))?;

        let slot = self.slot(inventory_id)?;
        let mut item = slot.lock().map_err(|_| poisoned("item"))?;

        // Re-read under the hold: a concurrent release may have won the race.
        let mut usages = self.usages.write().map_err(|_| poisoned("usages"))?;
        let usage = usages
            .get_mut(&usage_id)
            .ok_or_else(|| LedgerError::not_found(format!("usage record {usage_id}")))?;

        let movement = plan_resize(item.quantity, usage.quantity, new_quantity)
            .map_err(|e| LedgerError::from_stock(inventory_id, e))?;

        if !movement.is_noop() {
            usage.quantity = new_quantity;
            usage.updated_at = Utc::now();
            item.quantity = movement.stock_after;
        }

        debug!(%usage_id, stock_after = movement.stock_after, "usage resized");
        Ok(usage.clone())
    }

    fn release_sync(&self, usage_id: UsageId) -> LedgerResult<()> {
        let usage_id = usage_id.ensure_valid()?;

        let inventory_id = self
            .usage_item(usage_id)?
            .ok_or_else(|| LedgerError::not_found(format!("usage record {usage_id}")))?;

        let slot = self.slot(inventory_id)?;
        let mut item = slot.lock().map_err(|_| poisoned("item"))?;

        let mut usages = self.usages.write().map_err(|_| poisoned("usages"))?;
        let quantity = usages
            .get(&usage_id)
            .map(|u| u.quantity)
            .ok_or_else(|| LedgerError::not_found(format!("usage record {usage_id}")))?;

        let movement = plan_release(item.quantity, quantity)
            .map_err(|e| LedgerError::from_stock(inventory_id, e))?;

        usages.remove(&usage_id);
        item.quantity = movement.stock_after;

        debug!(%usage_id, stock_after = movement.stock_after, "usage released");
        Ok(())
    }

    fn usage_item(&self, usage_id: UsageId) -> LedgerResult<Option<InventoryItemId>> {
        let usages = self.usages.read().map_err(|_| poisoned("usages"))?;
        Ok(usages.get(&usage_id).map(|u| u.inventory_id))
    }

    fn list_sync(&self, work_order_id: WorkOrderId) -> LedgerResult<Vec<UsageLine>> {
        let records: Vec<UsageRecord> = {
            let usages = self.usages.read().map_err(|_| poisoned("usages"))?;
            usages
                .values()
                .filter(|u| u.work_order_id == work_order_id)
                .cloned()
                .collect()
        };

        let mut lines = Vec::with_capacity(records.len());
        for usage in records {
            let slot = self.slot(usage.inventory_id)?;
            let item = slot.lock().map_err(|_| poisoned("item"))?.clone();
            lines.push(UsageLine::new(usage, &item));
        }
        Ok(lines)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    #[instrument(skip(self), err)]
    async fn allocate(
        &self,
        work_order_id: WorkOrderId,
        inventory_id: InventoryItemId,
        quantity: i64,
    ) -> LedgerResult<UsageRecord> {
        self.allocate_sync(work_order_id, inventory_id, quantity)
    }

    #[instrument(skip(self), err)]
    async fn resize(&self, usage_id: UsageId, new_quantity: i64) -> LedgerResult<UsageRecord> {
        self.resize_sync(usage_id, new_quantity)
    }

    #[instrument(skip(self), err)]
    async fn release(&self, usage_id: UsageId) -> LedgerResult<()> {
        self.release_sync(usage_id)
    }

    async fn list_by_work_order(&self, work_order_id: WorkOrderId) -> LedgerResult<Vec<UsageLine>> {
        self.list_sync(work_order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(id: i64, quantity: i64) -> InventoryItem {
        InventoryItem {
            id: InventoryItemId::new(id),
            name: format!("part-{id}"),
            quantity,
            unit_price: Decimal::new(995, 2),
        }
    }

    fn ledger_with(item_id: i64, stock: i64, work_orders: &[i64]) -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.insert_item(item(item_id, stock)).unwrap();
        for wo in work_orders {
            ledger.register_work_order(WorkOrderId::new(*wo)).unwrap();
        }
        ledger
    }

    fn stock(ledger: &InMemoryLedger, id: i64) -> i64 {
        ledger.item(InventoryItemId::new(id)).unwrap().quantity
    }

    #[tokio::test]
    async fn allocate_until_exhausted() {
        let ledger = ledger_with(10, 5, &[1, 2]);

        let u = ledger
            .allocate(WorkOrderId::new(1), InventoryItemId::new(10), 5)
            .await
            .unwrap();
        assert_eq!(u.quantity, 5);
        assert_eq!(stock(&ledger, 10), 0);

        let err = ledger
            .allocate(WorkOrderId::new(2), InventoryItemId::new(10), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                inventory_id: InventoryItemId::new(10),
                requested: 1,
                available: 0
            }
        );
    }

    #[tokio::test]
    async fn allocate_then_release_restores_stock() {
        let ledger = ledger_with(10, 7, &[5]);

        let u = ledger
            .allocate(WorkOrderId::new(5), InventoryItemId::new(10), 3)
            .await
            .unwrap();
        assert_eq!(stock(&ledger, 10), 4);

        ledger.release(u.id).await.unwrap();
        assert_eq!(stock(&ledger, 10), 7);
        assert!(ledger.usage(u.id).is_none());
    }

    #[tokio::test]
    async fn failed_resize_leaves_everything_unchanged() {
        let ledger = ledger_with(10, 5, &[1]);
        let u = ledger
            .allocate(WorkOrderId::new(1), InventoryItemId::new(10), 3)
            .await
            .unwrap();
        assert_eq!(stock(&ledger, 10), 2);

        let err = ledger.resize(u.id, 6).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { requested: 3, available: 2, .. }));
        assert_eq!(stock(&ledger, 10), 2);
        assert_eq!(ledger.usage(u.id).unwrap().quantity, 3);

        let shrunk = ledger.resize(u.id, 1).await.unwrap();
        assert_eq!(shrunk.quantity, 1);
        assert_eq!(stock(&ledger, 10), 4);
    }

    #[tokio::test]
    async fn resize_to_same_quantity_is_a_noop() {
        let ledger = ledger_with(10, 5, &[1]);
        let u = ledger
            .allocate(WorkOrderId::new(1), InventoryItemId::new(10), 2)
            .await
            .unwrap();

        let same = ledger.resize(u.id, 2).await.unwrap();
        assert_eq!(same, u);
        assert_eq!(stock(&ledger, 10), 3);
    }

    #[tokio::test]
    async fn invalid_input_and_missing_entities() {
        let ledger = ledger_with(10, 5, &[1]);

        let err = ledger
            .allocate(WorkOrderId::new(1), InventoryItemId::new(10), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = ledger
            .allocate(WorkOrderId::new(-1), InventoryItemId::new(10), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = ledger
            .allocate(WorkOrderId::new(1), InventoryItemId::new(99), 1)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound("inventory item 99".to_string()));

        let err = ledger
            .allocate(WorkOrderId::new(42), InventoryItemId::new(10), 1)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound("work order 42".to_string()));

        assert!(matches!(
            ledger.resize(UsageId::new(77), 1).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.release(UsageId::new(77)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(stock(&ledger, 10), 5);
    }

    #[tokio::test]
    async fn release_removes_line_from_work_order_listing() {
        let ledger = ledger_with(10, 10, &[3]);
        ledger.insert_item(item(11, 10)).unwrap();

        let keep = ledger
            .allocate(WorkOrderId::new(3), InventoryItemId::new(11), 2)
            .await
            .unwrap();
        let released = ledger
            .allocate(WorkOrderId::new(3), InventoryItemId::new(10), 4)
            .await
            .unwrap();
        assert_eq!(stock(&ledger, 10), 6);

        ledger.release(released.id).await.unwrap();
        assert_eq!(stock(&ledger, 10), 10);

        let lines = ledger.list_by_work_order(WorkOrderId::new(3)).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].usage.id, keep.id);
        assert_eq!(lines[0].item_name, "part-11");
        assert_eq!(lines[0].line_total(), Decimal::new(1990, 2));
    }

    #[test]
    fn seeding_after_a_poisoned_write_reports_failure() {
        let ledger = InMemoryLedger::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ledger.work_orders.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(matches!(
            ledger.register_work_order(WorkOrderId::new(1)),
            Err(LedgerError::TransientStoreFailure(_))
        ));
        assert!(ledger.insert_item(item(10, 5)).is_ok());
    }
}
