//! Entry Cache
//!
//! Cache contract holding either a live link entry or a tombstone. Structured
//! entries are JSON documents layered on top of the raw string operations, so
//! any key/value backend with per-key TTL can implement the trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CacheResult;

/// Why a key is negatively cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TombstoneReason {
    /// The record exists but is past its expiration
    Expired,
    /// No record exists for the key
    Deleted,
}

impl fmt::Display for TombstoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TombstoneReason::Expired => write!(f, "expired"),
            TombstoneReason::Deleted => write!(f, "deleted"),
        }
    }
}

/// Cached view of a link, or a tombstone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Not meaningful when `is_tombstone` is set
    #[serde(default)]
    pub long_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_tombstone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TombstoneReason>,
}

impl CacheEntry {
    pub fn live(long_url: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            long_url: long_url.into(),
            expires_at,
            created_at: Utc::now(),
            is_tombstone: false,
            reason: None,
        }
    }

    pub fn tombstone(reason: TombstoneReason) -> Self {
        Self {
            long_url: String::new(),
            expires_at: None,
            created_at: Utc::now(),
            is_tombstone: true,
            reason: Some(reason),
        }
    }

    /// Logical expiration, independent of the cache TTL
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Utc::now() > t).unwrap_or(false)
    }
}

/// Distributed key/value cache with per-key TTL
pub trait EntryCache: Send + Sync {
    /// Raw value lookup; `Ok(None)` on a miss
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    fn delete(&self, key: &str) -> CacheResult<()>;

    fn exists(&self, key: &str) -> CacheResult<bool>;

    fn set_entry(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> CacheResult<()> {
        let encoded = serde_json::to_string(entry)?;
        self.set(key, &encoded, ttl)
    }

    /// Structured lookup. A value that is not a JSON entry is treated as a
    /// legacy plain-URL mapping.
    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(_) => Ok(Some(CacheEntry::live(raw, None))),
        }
    }

    fn set_tombstone(&self, key: &str, reason: TombstoneReason, ttl: Duration) -> CacheResult<()> {
        self.set_entry(key, &CacheEntry::tombstone(reason), ttl)
    }
}
