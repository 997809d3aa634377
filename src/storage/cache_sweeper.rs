//! Cache Sweeper
//!
//! Background task that periodically evicts TTL-elapsed keys from MemoryCache.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::MemoryCache;

/// Background TTL eviction task for MemoryCache
pub struct CacheSweeper {
    cache: MemoryCache,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: MemoryCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run the sweeper (should be spawned as a task)
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Cache sweeper started");

        loop {
            ticker.tick().await;
            let removed = self.cache.cleanup_expired();
            if removed > 0 {
                debug!(removed, remaining = self.cache.len(), "Evicted TTL-elapsed cache keys");
            }
        }
    }

    /// Spawn the sweeper as a background task
    pub fn spawn(cache: MemoryCache, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(cache, interval).run())
    }
}
