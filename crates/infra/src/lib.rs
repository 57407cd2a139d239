//! `repairdesk-infra` — configuration, persistence and the billing service.
//!
//! Domain crates stay IO-free; everything that touches a database or the
//! environment lives here.

pub mod config;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use service::{BillingService, ServiceError, ServiceResult};
pub use store::{BillingStore, StoreError, StoreResult};
