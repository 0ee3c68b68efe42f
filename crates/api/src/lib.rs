//! HTTP API: router, service wiring, and request/response mapping.

pub mod app;
