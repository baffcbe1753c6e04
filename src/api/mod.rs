//! HTTP surface over the provider manager.

pub mod routes;
pub mod types;

pub use routes::{ApiError, AppState, router, wait_for_shutdown};
