//! Observability Module
//!
//! Health checks and diagnostics.

mod health;

pub use health::{CheckResult, HealthCheck, HealthStatus, SystemHealth};
