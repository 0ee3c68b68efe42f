//! Strongly-typed identifiers used across the domain.
//!
//! The relational store hands out `BIGSERIAL` keys, so every identifier wraps an
//! `i64`. Only strictly positive values are valid references.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an inventory item (a stocked part).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(i64);

/// Identifier of a work-order inventory usage record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageId(i64);

/// Identifier of a work order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkOrderId(i64);

/// Identifier of a rental record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Validate that the identifier can reference a stored row.
            pub fn ensure_valid(self) -> Result<Self, DomainError> {
                if self.0 > 0 {
                    Ok(self)
                } else {
                    Err(DomainError::invalid_id(format!(
                        "{} must be positive, got {}",
                        $name, self.0
                    )))
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = i64::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self(raw).ensure_valid()
            }
        }
    };
}

impl_i64_newtype!(InventoryItemId, "InventoryItemId");
impl_i64_newtype!(UsageId, "UsageId");
impl_i64_newtype!(WorkOrderId, "WorkOrderId");
impl_i64_newtype!(RentalId, "RentalId");
