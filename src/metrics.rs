//! Basic Metrics
//!
//! Read-path counters and per-route latency tracking.

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a resolution was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Live entry served from cache
    CacheHit,
    /// Tombstone served from cache
    TombstoneHit,
    /// Answered by the record store
    StoreLookup,
}

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    cache_hits: AtomicU64,
    tombstone_hits: AtomicU64,
    store_lookups: AtomicU64,
    expired: AtomicU64,
    not_found: AtomicU64,
    visits_counted: AtomicU64,
    visits_deduplicated: AtomicU64,

    /// Requests per route
    ops_by_route: RwLock<HashMap<String, u64>>,

    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            tombstone_hits: AtomicU64::new(0),
            store_lookups: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            visits_counted: AtomicU64::new(0),
            visits_deduplicated: AtomicU64::new(0),
            ops_by_route: RwLock::new(HashMap::new()),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
        }
    }

    pub fn record_resolve(&self, outcome: ResolveOutcome) {
        let counter = match outcome {
            ResolveOutcome::CacheHit => &self.cache_hits,
            ResolveOutcome::TombstoneHit => &self.tombstone_hits,
            ResolveOutcome::StoreLookup => &self.store_lookups,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit(&self, counted: bool) {
        if counted {
            self.visits_counted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.visits_deduplicated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one served request
    pub fn record_request(&self, route: &str, latency: Duration) {
        *self.ops_by_route.write().entry(route.to_string()).or_insert(0) += 1;

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn tombstone_hits(&self) -> u64 {
        self.tombstone_hits.load(Ordering::Relaxed)
    }

    pub fn store_lookups(&self) -> u64 {
        self.store_lookups.load(Ordering::Relaxed)
    }

    pub fn visits_counted(&self) -> u64 {
        self.visits_counted.load(Ordering::Relaxed)
    }

    pub fn visits_deduplicated(&self) -> u64 {
        self.visits_deduplicated.load(Ordering::Relaxed)
    }

    pub fn ops_by_route(&self) -> HashMap<String, u64> {
        self.ops_by_route.read().clone()
    }

    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_sum_us.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Fraction of resolutions answered from cache (live or tombstone)
    pub fn cache_hit_ratio(&self) -> f64 {
        let cached = self.cache_hits() + self.tombstone_hits();
        let total = cached + self.store_lookups();
        if total == 0 {
            0.0
        } else {
            cached as f64 / total as f64
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "resolve": {
                "cache_hits": self.cache_hits(),
                "tombstone_hits": self.tombstone_hits(),
                "store_lookups": self.store_lookups(),
                "expired": self.expired.load(Ordering::Relaxed),
                "not_found": self.not_found.load(Ordering::Relaxed),
                "cache_hit_ratio": self.cache_hit_ratio(),
            },
            "visits": {
                "counted": self.visits_counted(),
                "deduplicated": self.visits_deduplicated(),
            },
            "requests": {
                "by_route": self.ops_by_route(),
                "avg_latency_us": self.avg_latency_us(),
                "max_latency_us": self.latency_max_us.load(Ordering::Relaxed),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();

        metrics.record_resolve(ResolveOutcome::CacheHit);
        metrics.record_resolve(ResolveOutcome::TombstoneHit);
        metrics.record_resolve(ResolveOutcome::StoreLookup);
        metrics.record_resolve(ResolveOutcome::CacheHit);
        assert!((metrics.cache_hit_ratio() - 0.75).abs() < 1e-9);

        metrics.record_request("GET /:key", Duration::from_micros(100));
        metrics.record_request("GET /:key", Duration::from_micros(300));
        metrics.record_request("POST /api/shorten", Duration::from_micros(200));
        assert!((metrics.avg_latency_us() - 200.0).abs() < 0.1);
        assert_eq!(metrics.ops_by_route().get("GET /:key"), Some(&2));

        metrics.record_visit(true);
        metrics.record_visit(false);
        let json = metrics.to_json();
        assert_eq!(json["visits"]["counted"], 1);
        assert_eq!(json["visits"]["deduplicated"], 1);
        assert_eq!(json["requests"]["max_latency_us"], 300);
    }
}
