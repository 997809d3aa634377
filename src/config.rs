//! Configuration
//!
//! Server, shortener and reaper settings with builder-style overrides.

use serde::Serialize;
use std::time::Duration;

/// Reaper configuration, immutable once the reaper is built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupConfig {
    /// Time between reaper ticks
    pub interval: Duration,
    /// Maximum records deleted per tick
    pub batch_size: usize,
    /// How long past expiration a record must be before it is deleted
    pub buffer_time: Duration,
    /// Upper bound on how long one tick may occupy the reaper
    pub max_cleanup_duration: Duration,
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            batch_size: 1000,
            buffer_time: Duration::from_secs(60 * 60),
            max_cleanup_duration: Duration::from_secs(5 * 60),
            enabled: true,
        }
    }
}

impl CleanupConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_buffer_time(mut self, buffer_time: Duration) -> Self {
        self.buffer_time = buffer_time;
        self
    }

    pub fn with_max_cleanup_duration(mut self, max: Duration) -> Self {
        self.max_cleanup_duration = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("Cleanup interval must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("Cleanup batch size must be greater than 0".to_string());
        }
        if self.max_cleanup_duration.is_zero() {
            return Err("Max cleanup duration must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub bind: String,

    /// Port number
    pub port: u16,

    /// Prefix for generated short URLs
    pub base_url: String,

    /// Lifetime of a link created without an explicit TTL
    pub default_link_ttl: Duration,

    /// Ceiling on the cache TTL of a live entry
    pub cache_ttl: Duration,

    /// Floor on the cache TTL of a live entry
    pub min_cache_ttl: Duration,

    /// Cache TTL of tombstones
    pub tombstone_ttl: Duration,

    /// Repeat visits to one key inside this window count once
    pub dedup_window: Duration,

    /// How often the dedup map is pruned
    pub dedup_prune_interval: Duration,

    /// How often TTL-elapsed cache keys are evicted
    pub cache_sweep_interval: Duration,

    /// Snowflake node id (0-1023)
    pub node_id: i64,

    /// Bearer token required on admin routes
    pub admin_api_key: Option<String>,

    pub cleanup: CleanupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            default_link_ttl: Duration::from_secs(24 * 60 * 60),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            min_cache_ttl: Duration::from_secs(60),
            tombstone_ttl: Duration::from_secs(60 * 60),
            dedup_window: Duration::from_secs(3),
            dedup_prune_interval: Duration::from_secs(30),
            cache_sweep_interval: Duration::from_secs(10),
            node_id: 1,
            admin_api_key: None,
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Config {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_node_id(mut self, node_id: i64) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_admin_api_key(mut self, key: impl Into<String>) -> Self {
        self.admin_api_key = Some(key.into());
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
