//! Cross-component tests against the in-memory and Postgres adapters.
//!
//! Verifies:
//! - Concurrent allocations never drive stock negative
//! - Stock is conserved across arbitrary allocate/resize/release sequences
//! - Ledger and scheduler can share one runtime without interfering
//! - The Postgres adapters hold the same guarantees under row locks
//!
//! The Postgres tests are ignored by default. Run them with
//! `DATABASE_URL=postgres://... cargo test -p rentdesk-infra -- --ignored`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use rentdesk_core::{InventoryItemId, RentalId, UsageId, WorkOrderId};
    use rentdesk_inventory::InventoryItem;
    use rentdesk_rentals::{RentalRecord, RentalStatus};

    use crate::ledger::{InMemoryLedger, InventoryLedger, LedgerError};
    use crate::rentals::{InMemoryRentalStore, RentalStore};
    use crate::scheduler::LifecycleScheduler;

    const ITEM: InventoryItemId = InventoryItemId::new(10);
    const WORK_ORDER: WorkOrderId = WorkOrderId::new(5);

    fn ledger_with_stock(quantity: i64) -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .insert_item(InventoryItem {
                id: ITEM,
                name: "Brake pad".to_string(),
                quantity,
                unit_price: Decimal::new(1999, 2),
            })
            .unwrap();
        ledger.register_work_order(WORK_ORDER).unwrap();
        ledger
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_never_oversell() {
        let ledger = ledger_with_stock(10);

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.allocate(WORK_ORDER, ITEM, 1).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, 0);
                    insufficient += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(insufficient, 15);
        assert_eq!(ledger.item(ITEM).unwrap().quantity, 0);

        let lines = ledger.list_by_work_order(WORK_ORDER).await.unwrap();
        assert_eq!(lines.iter().map(|l| l.usage.quantity).sum::<i64>(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resizes_and_releases_keep_stock_consistent() {
        let ledger = ledger_with_stock(40);
        let mut usages = Vec::new();
        for _ in 0..8 {
            usages.push(ledger.allocate(WORK_ORDER, ITEM, 2).await.unwrap().id);
        }

        let tasks: Vec<_> = usages
            .iter()
            .enumerate()
            .map(|(i, usage_id)| {
                let ledger = ledger.clone();
                let usage_id = *usage_id;
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        ledger.release(usage_id).await.map(|_| ())
                    } else {
                        ledger.resize(usage_id, 5).await.map(|_| ())
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // 4 released, 4 resized to 5 units each.
        assert_eq!(ledger.item(ITEM).unwrap().quantity, 40 - 20);
        let lines = ledger.list_by_work_order(WORK_ORDER).await.unwrap();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.usage.quantity == 5));
    }

    #[tokio::test]
    async fn scheduler_and_ledger_share_a_runtime() {
        let ledger = ledger_with_stock(3);
        let rentals = Arc::new(InMemoryRentalStore::new());
        let now = Utc::now();
        rentals
            .insert(RentalRecord::new(
                RentalId::new(1),
                RentalStatus::Active,
                now - ChronoDuration::days(3),
                now - ChronoDuration::hours(1),
            ))
            .unwrap();
        let scheduler = LifecycleScheduler::new(rentals.clone(), Duration::from_secs(60));

        let (allocated, swept) = tokio::join!(
            ledger.allocate(WORK_ORDER, ITEM, 3),
            scheduler.run_overdue_sweep(),
        );

        assert_eq!(allocated.unwrap().quantity, 3);
        assert_eq!(swept.unwrap(), 1);
        assert_eq!(
            rentals.get(RentalId::new(1)).await.unwrap().unwrap().status,
            RentalStatus::Overdue
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(i64),
        Resize(usize, i64),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..8).prop_map(Op::Allocate),
            (0usize..8, 1i64..8).prop_map(|(i, q)| Op::Resize(i, q)),
            (0usize..8).prop_map(Op::Release),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn stock_is_conserved_for_any_sequence(
            initial in 0i64..30,
            ops in prop::collection::vec(op(), 0..40),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let ledger = ledger_with_stock(initial);
                let mut live: Vec<UsageId> = Vec::new();

                for op in ops {
                    match op {
                        Op::Allocate(q) => {
                            if let Ok(usage) = ledger.allocate(WORK_ORDER, ITEM, q).await {
                                live.push(usage.id);
                            }
                        }
                        Op::Resize(i, q) if !live.is_empty() => {
                            let _ = ledger.resize(live[i % live.len()], q).await;
                        }
                        Op::Release(i) if !live.is_empty() => {
                            let usage_id = live.remove(i % live.len());
                            ledger.release(usage_id).await.unwrap();
                        }
                        _ => {}
                    }

                    let stock = ledger.item(ITEM).unwrap().quantity;
                    let held: i64 = ledger
                        .list_by_work_order(WORK_ORDER)
                        .await
                        .unwrap()
                        .iter()
                        .map(|l| l.usage.quantity)
                        .sum();
                    assert!(stock >= 0);
                    assert_eq!(stock + held, initial);
                }
            });
        }
    }
}

#[cfg(test)]
mod postgres_tests {
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use sqlx::{PgPool, Row};

    use rentdesk_core::{InventoryItemId, RentalId, WorkOrderId};
    use rentdesk_rentals::{LifecycleJob, RentalStatus};

    use crate::config::DatabaseConfig;
    use crate::db;
    use crate::ledger::{InventoryLedger, LedgerError, PostgresLedger};
    use crate::rentals::{PostgresRentalStore, RentalStore};

    async fn pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = db::connect(&url, &DatabaseConfig::default())
            .await
            .expect("connect to DATABASE_URL");
        db::apply_schema(&pool).await.expect("apply schema");
        Some(pool)
    }

    async fn seed_item(pool: &PgPool, quantity: i64) -> InventoryItemId {
        let row = sqlx::query(
            "INSERT INTO inventory (name, quantity, unit_price) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind("Brake pad")
        .bind(quantity)
        .bind(Decimal::new(1250, 2))
        .fetch_one(pool)
        .await
        .unwrap();
        InventoryItemId::new(row.get::<i64, _>("id"))
    }

    async fn seed_work_order(pool: &PgPool) -> WorkOrderId {
        let row = sqlx::query("INSERT INTO work_orders DEFAULT VALUES RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
        WorkOrderId::new(row.get::<i64, _>("id"))
    }

    async fn stock(pool: &PgPool, item: InventoryItemId) -> i64 {
        sqlx::query("SELECT quantity FROM inventory WHERE id = $1")
            .bind(item.get())
            .fetch_one(pool)
            .await
            .unwrap()
            .get::<i64, _>("quantity")
    }

    async fn seed_rental(
        pool: &PgPool,
        status: RentalStatus,
        start: DateTime<Utc>,
        due: DateTime<Utc>,
    ) -> RentalId {
        let row = sqlx::query(
            "INSERT INTO rentals (status, start_date, due_date) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(status.as_str())
        .bind(start)
        .bind(due)
        .fetch_one(pool)
        .await
        .unwrap();
        RentalId::new(row.get::<i64, _>("id"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_allocations_never_oversell() {
        let Some(pool) = pool().await else { return };
        let item = seed_item(&pool, 5).await;
        let work_order = seed_work_order(&pool).await;
        let ledger = PostgresLedger::new(pool.clone());

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.allocate(work_order, item, 1).await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientStock { available, .. }) => assert_eq!(available, 0),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(stock(&pool, item).await, 0);
        let lines = ledger.list_by_work_order(work_order).await.unwrap();
        assert_eq!(lines.iter().map(|l| l.usage.quantity).sum::<i64>(), 5);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn missing_work_order_rolls_back_the_stock_write() {
        let Some(pool) = pool().await else { return };
        let item = seed_item(&pool, 5).await;
        let ledger = PostgresLedger::new(pool.clone());

        let err = ledger
            .allocate(WorkOrderId::new(i64::MAX), item, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::NotFound(ref what) if what.contains("work order")));
        assert_eq!(stock(&pool, item).await, 5);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn failed_resize_leaves_stock_and_usage_untouched() {
        let Some(pool) = pool().await else { return };
        let item = seed_item(&pool, 5).await;
        let work_order = seed_work_order(&pool).await;
        let ledger = PostgresLedger::new(pool.clone());

        let usage = ledger.allocate(work_order, item, 3).await.unwrap();
        assert_eq!(stock(&pool, item).await, 2);

        let err = ledger.resize(usage.id, 6).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(stock(&pool, item).await, 2);
        let lines = ledger.list_by_work_order(work_order).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].usage.quantity, 3);

        let resized = ledger.resize(usage.id, 1).await.unwrap();
        assert_eq!(resized.quantity, 1);
        assert_eq!(stock(&pool, item).await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn racing_release_and_resize_restore_stock() {
        let Some(pool) = pool().await else { return };
        let item = seed_item(&pool, 10).await;
        let work_order = seed_work_order(&pool).await;
        let ledger = PostgresLedger::new(pool.clone());
        let usage = ledger.allocate(work_order, item, 4).await.unwrap();

        let (released, resized) = tokio::join!(
            tokio::spawn({
                let ledger = ledger.clone();
                async move { ledger.release(usage.id).await }
            }),
            tokio::spawn({
                let ledger = ledger.clone();
                async move { ledger.resize(usage.id, 7).await }
            }),
        );

        released.unwrap().unwrap();
        match resized.unwrap() {
            Ok(_) | Err(LedgerError::NotFound(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert_eq!(stock(&pool, item).await, 10);
        assert!(ledger.list_by_work_order(work_order).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs DATABASE_URL"]
    async fn overlapping_sweeps_count_each_rental_once() {
        let Some(pool) = pool().await else { return };
        let store = PostgresRentalStore::new(pool.clone());

        // Far enough in the past that no other fixture starts in this window.
        let at = Utc::now() - ChronoDuration::days(3650);
        store
            .apply_transition(LifecycleJob::ReservedToActive, at - ChronoDuration::seconds(1))
            .await
            .unwrap();
        let id = seed_rental(&pool, RentalStatus::Reserved, at, at + ChronoDuration::days(2)).await;

        let (first, second) = tokio::join!(
            store.apply_transition(LifecycleJob::ReservedToActive, at),
            store.apply_transition(LifecycleJob::ReservedToActive, at),
        );

        assert_eq!(first.unwrap() + second.unwrap(), 1);
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, RentalStatus::Active);
    }
}
