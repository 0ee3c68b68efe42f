use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentdesk_core::{DomainError, RentalId};

/// Rental status as stored in the `rentals.status` column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Reserved,
    Active,
    Overdue,
    Returned,
    Cancelled,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Reserved => "reserved",
            RentalStatus::Active => "active",
            RentalStatus::Overdue => "overdue",
            RentalStatus::Returned => "returned",
            RentalStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are owned by operator workflows; the scheduler never touches them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RentalStatus::Returned | RentalStatus::Cancelled)
    }
}

impl core::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(RentalStatus::Reserved),
            "active" => Ok(RentalStatus::Active),
            "overdue" => Ok(RentalStatus::Overdue),
            "returned" => Ok(RentalStatus::Returned),
            "cancelled" => Ok(RentalStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown rental status: {other}"))),
        }
    }
}

/// The scheduler-relevant projection of a rental row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalRecord {
    pub id: RentalId,
    pub status: RentalStatus,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalRecord {
    pub fn new(
        id: RentalId,
        status: RentalStatus,
        start_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status,
            start_date,
            due_date,
            updated_at: start_date,
        }
    }
}
