use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rentdesk_core::RentalId;
use rentdesk_rentals::{LifecycleJob, RentalRecord};

use super::{RentalStore, RentalStoreError};

fn poisoned() -> RentalStoreError {
    RentalStoreError::TransientStoreFailure("rentals lock poisoned".to_string())
}

/// In-memory rental table for tests/dev.
///
/// A transition holds the write lock for the whole scan, so readers observe
/// either none or all of its changes.
#[derive(Debug, Default)]
pub struct InMemoryRentalStore {
    rentals: RwLock<BTreeMap<RentalId, RentalRecord>>,
}

impl InMemoryRentalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or replace) a rental record.
    pub fn insert(&self, record: RentalRecord) -> Result<(), RentalStoreError> {
        self.rentals
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id, record);
        Ok(())
    }

    fn transition_sync(
        &self,
        job: LifecycleJob,
        now: DateTime<Utc>,
    ) -> Result<u64, RentalStoreError> {
        let mut map = self.rentals.write().map_err(|_| poisoned())?;

        let mut updated = 0;
        for record in map.values_mut() {
            if job.apply(record, now) {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl RentalStore for InMemoryRentalStore {
    async fn apply_transition(
        &self,
        job: LifecycleJob,
        now: DateTime<Utc>,
    ) -> Result<u64, RentalStoreError> {
        self.transition_sync(job, now)
    }

    async fn get(&self, id: RentalId) -> Result<Option<RentalRecord>, RentalStoreError> {
        let map = self.rentals.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }
}
