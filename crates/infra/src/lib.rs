//! Infrastructure layer: stores, cache, revocation, audit, config and use cases.

pub mod audit;
pub mod cache;
pub mod config;
pub mod deadline;
pub mod error;
pub mod revocation;
pub mod services;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use deadline::Deadline;
pub use error::{ServiceError, ServiceResult};
