//! Operator library for the KPT monitoring controller
//!
//! This crate provides the core functionality for:
//! - Typed access to `KptMonitor` resources and probe pods
//! - Dispatching monitoring requests to the probe fleet
//! - Deriving and writing back resource status
//! - The periodic reconciliation loop
//! - CRD bootstrap, fleet reporting, health checks and observability

pub mod bootstrap;
pub mod client;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod health;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod reconciler;
pub mod status;
pub mod store;

pub use error::{OperatorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OperatorMetrics, StructuredLogger};
