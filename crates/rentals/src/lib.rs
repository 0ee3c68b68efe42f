//! Rental domain module.
//!
//! Rental records and the two time-driven lifecycle rules the scheduler applies
//! to them. Deterministic: every predicate takes the evaluation instant as an
//! argument instead of reading the clock.

pub mod lifecycle;
pub mod rental;

pub use lifecycle::LifecycleJob;
pub use rental::{RentalRecord, RentalStatus};
