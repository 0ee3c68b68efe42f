use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use rentdesk_infra::config::AppConfig;
use rentdesk_infra::db;
use rentdesk_infra::ledger::{InMemoryLedger, InventoryLedger, PostgresLedger};
use rentdesk_infra::rentals::{InMemoryRentalStore, PostgresRentalStore};
use rentdesk_infra::scheduler::LifecycleScheduler;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub ledger: Arc<dyn InventoryLedger>,
    pub scheduler: Arc<LifecycleScheduler>,
}

impl AppServices {
    /// In-memory wiring (dev/test). Callers keep their own handles to seed data.
    pub fn in_memory(
        ledger: Arc<InMemoryLedger>,
        rentals: Arc<InMemoryRentalStore>,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            scheduler: Arc::new(LifecycleScheduler::new(rentals, interval)),
        }
    }
}

/// Pick adapters from configuration: Postgres when `database.url` is set.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, sqlx::Error> {
    let interval = config.scheduler.interval();

    let Some(url) = config.database.url.as_deref() else {
        warn!("database.url not set; using in-memory stores (data is lost on restart)");
        return Ok(AppServices::in_memory(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryRentalStore::new()),
            interval,
        ));
    };

    let pool = db::connect(url, &config.database).await?;
    db::apply_schema(&pool).await?;
    info!("schema applied; using postgres stores");

    Ok(AppServices {
        ledger: Arc::new(PostgresLedger::new(pool.clone())),
        scheduler: Arc::new(LifecycleScheduler::new(
            Arc::new(PostgresRentalStore::new(pool)),
            interval,
        )),
    })
}
