//! Health Checks
//!
//! Server health status and diagnostics.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

/// System health summary
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    #[serde(rename = "status")]
    pub overall: HealthStatus,
    pub checks: Vec<CheckResult>,
    #[serde(rename = "uptime_secs", serialize_with = "as_secs")]
    pub uptime: Duration,
    pub version: String,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Health check function type
pub type CheckFn = Box<dyn Fn() -> (HealthStatus, Option<String>) + Send + Sync>;

/// Health check manager
pub struct HealthCheck {
    /// Ordered so reports are stable
    checks: BTreeMap<String, CheckFn>,
    start_time: Instant,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            checks: BTreeMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Register a health check
    pub fn register<F>(&mut self, name: &str, check: F)
    where
        F: Fn() -> (HealthStatus, Option<String>) + Send + Sync + 'static,
    {
        self.checks.insert(name.to_string(), Box::new(check));
    }

    /// Run all health checks
    pub fn check(&self) -> SystemHealth {
        let mut results = Vec::with_capacity(self.checks.len());
        let mut overall = HealthStatus::Healthy;

        for (name, check_fn) in &self.checks {
            let start = Instant::now();
            let (status, message) = check_fn();
            let duration = start.elapsed();

            match status {
                HealthStatus::Unhealthy => overall = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall == HealthStatus::Healthy => {
                    overall = HealthStatus::Degraded;
                }
                _ => {}
            }

            results.push(CheckResult {
                name: name.clone(),
                status,
                message,
                duration,
            });
        }

        SystemHealth {
            overall,
            checks: results,
            uptime: self.start_time.elapsed(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Readiness check (all checks healthy)
    pub fn readiness(&self) -> bool {
        self.check().overall == HealthStatus::Healthy
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check() {
        let mut health = HealthCheck::new();

        health.register("store", || (HealthStatus::Healthy, None));
        health.register("reaper", || {
            (HealthStatus::Degraded, Some("Reaper not running".to_string()))
        });

        let result = health.check();
        assert_eq!(result.overall, HealthStatus::Degraded);
        assert_eq!(result.checks.len(), 2);
        assert_eq!(result.checks[0].name, "reaper");
        assert!(!health.readiness());
    }

    #[test]
    fn test_health_json() {
        let mut health = HealthCheck::new();
        health.register("store", || (HealthStatus::Healthy, None));

        let json = serde_json::to_value(health.check()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"][0]["name"], "store");
        assert!(json["checks"][0].get("message").is_none());
        assert!(json["version"].is_string());
    }

    #[test]
    fn test_unhealthy_wins() {
        let mut health = HealthCheck::new();
        health.register("a", || (HealthStatus::Unhealthy, Some("down".into())));
        health.register("b", || (HealthStatus::Degraded, None));
        assert_eq!(health.check().overall, HealthStatus::Unhealthy);
    }
}
