//! Time-driven lifecycle rules.
//!
//! ```text
//! reserved --(now >= start_date)--> active --(now > due_date)--> overdue
//! ```
//!
//! Each rule only matches records in its source status and moves them to its
//! target status, so re-applying a rule after it took effect matches nothing.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentdesk_core::DomainError;

use crate::rental::{RentalRecord, RentalStatus};

/// One named scheduled transition rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleJob {
    #[serde(rename = "reserved-to-active")]
    ReservedToActive,
    #[serde(rename = "overdue")]
    Overdue,
}

impl LifecycleJob {
    pub const ALL: [LifecycleJob; 2] = [LifecycleJob::ReservedToActive, LifecycleJob::Overdue];

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleJob::ReservedToActive => "reserved-to-active",
            LifecycleJob::Overdue => "overdue",
        }
    }

    pub fn from_status(&self) -> RentalStatus {
        match self {
            LifecycleJob::ReservedToActive => RentalStatus::Reserved,
            LifecycleJob::Overdue => RentalStatus::Active,
        }
    }

    pub fn to_status(&self) -> RentalStatus {
        match self {
            LifecycleJob::ReservedToActive => RentalStatus::Active,
            LifecycleJob::Overdue => RentalStatus::Overdue,
        }
    }

    /// Whether `record` should be moved by this rule at instant `now`.
    pub fn qualifies(&self, record: &RentalRecord, now: DateTime<Utc>) -> bool {
        if record.status != self.from_status() {
            return false;
        }
        match self {
            LifecycleJob::ReservedToActive => now >= record.start_date,
            LifecycleJob::Overdue => now > record.due_date,
        }
    }

    /// Apply the rule to one record. Returns `true` if the record changed.
    pub fn apply(&self, record: &mut RentalRecord, now: DateTime<Utc>) -> bool {
        if !self.qualifies(record, now) {
            return false;
        }
        record.status = self.to_status();
        record.updated_at = now;
        true
    }
}

impl core::fmt::Display for LifecycleJob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleJob {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved-to-active" => Ok(LifecycleJob::ReservedToActive),
            "overdue" => Ok(LifecycleJob::Overdue),
            other => Err(DomainError::validation(format!("unknown lifecycle job: {other}"))),
        }
    }
}
