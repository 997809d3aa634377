//! In-Memory TTL Cache
//!
//! Sharded key/value cache built on DashMap. Implements the raw half of
//! [`EntryCache`]; structured entries and tombstones come from the trait's
//! default methods.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::EntryCache;
use crate::error::CacheResult;

/// Cached value with its TTL deadline
#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: String, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now + Duration::from_secs(86_400 * 365)),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent in-memory cache with per-key TTL
///
/// Each DashMap shard has its own lock, so lookups on different keys
/// proceed in parallel.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Slot>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Create with specified shard count (must be a power of two)
    pub fn with_shard_amount(shard_amount: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::with_shard_amount(shard_amount)),
        }
    }

    /// Shard count sized to the machine
    pub fn for_host() -> Self {
        Self::with_shard_amount((num_cpus::get() * 4).next_power_of_two())
    }

    /// Number of keys (TTL-elapsed keys included until swept)
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop keys whose TTL has elapsed, returns count removed
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.inner.retain(|_, slot| {
            if slot.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}

impl EntryCache for MemoryCache {
    #[inline]
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.inner.get(key).and_then(|slot| {
            if slot.is_expired() {
                None
            } else {
                Some(slot.value.clone())
            }
        }))
    }

    #[inline]
    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.inner
            .insert(key.to_string(), Slot::new(value.to_string(), ttl));
        Ok(())
    }

    #[inline]
    fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.remove(key);
        Ok(())
    }

    #[inline]
    fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .inner
            .get(key)
            .map(|slot| !slot.is_expired())
            .unwrap_or(false))
    }
}
