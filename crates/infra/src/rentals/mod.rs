//! Rental record storage for the lifecycle scheduler.
//!
//! The scheduler only ever needs one mutation: "move every record that
//! qualifies for `job` at `now`". Adapters must perform it as a single atomic
//! unit so a scan never flips a partial subset of the qualifying records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rentdesk_core::RentalId;
use rentdesk_rentals::{LifecycleJob, RentalRecord};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryRentalStore;
pub use postgres::PostgresRentalStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RentalStoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient store failure: {0}")]
    TransientStoreFailure(String),
}

#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Apply `job` to every record qualifying at `now`; returns how many changed.
    async fn apply_transition(
        &self,
        job: LifecycleJob,
        now: DateTime<Utc>,
    ) -> Result<u64, RentalStoreError>;

    async fn get(&self, id: RentalId) -> Result<Option<RentalRecord>, RentalStoreError>;
}

#[async_trait]
impl<S> RentalStore for Arc<S>
where
    S: RentalStore + ?Sized,
{
    async fn apply_transition(
        &self,
        job: LifecycleJob,
        now: DateTime<Utc>,
    ) -> Result<u64, RentalStoreError> {
        (**self).apply_transition(job, now).await
    }

    async fn get(&self, id: RentalId) -> Result<Option<RentalRecord>, RentalStoreError> {
        (**self).get(id).await
    }
}
