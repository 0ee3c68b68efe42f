//! Infrastructure layer: configuration, Postgres wiring, the inventory ledger,
//! rental storage and the lifecycle scheduler.

pub mod config;
pub mod db;
pub mod ledger;
pub mod rentals;
pub mod scheduler;

mod integration_tests;
