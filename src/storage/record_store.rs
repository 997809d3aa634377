//! Record Store
//!
//! Persistence contract for link records plus a thread-safe in-memory
//! implementation. All mutations of one call happen under a single write
//! guard, which gives each call the atomicity of one store transaction.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::model::{LongUrl, Record, ShortKey};

/// Persistence operations consumed by the shortener, visit counter and reaper
pub trait RecordStore: Send + Sync {
    /// Insert a new record; fails with `Duplicate` if the key is taken
    fn save(&self, record: Record) -> StoreResult<()>;

    fn find_by_short_key(&self, key: &ShortKey) -> StoreResult<Record>;

    /// Most recently created record for a long URL
    fn find_by_long_url(&self, url: &LongUrl) -> StoreResult<Record>;

    /// Overwrite URL, expiration and visit count of an existing record
    fn update(&self, record: &Record) -> StoreResult<()>;

    fn delete(&self, key: &ShortKey) -> StoreResult<()>;

    fn exists_by_short_key(&self, key: &ShortKey) -> StoreResult<bool>;

    /// Atomically add one visit and stamp `last_accessed_at`
    fn increment_visit_count(&self, key: &ShortKey) -> StoreResult<()>;

    /// Records with `expires_at < cutoff`, oldest expiration first
    fn find_expired_before(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Record>>;

    /// Delete every listed key in one transaction. Keys that are already gone
    /// are skipped; returns the number of rows actually removed.
    fn delete_batch(&self, keys: &[ShortKey]) -> StoreResult<usize>;

    fn count_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<i64>;
}

#[derive(Debug, Default)]
struct Tables {
    by_key: HashMap<ShortKey, Record>,
    /// long URL -> (created_at, key) of every record for it; the last entry is
    /// the newest
    by_long_url: HashMap<LongUrl, BTreeSet<(DateTime<Utc>, ShortKey)>>,
}

impl Tables {
    fn link(&mut self, url: &LongUrl, created_at: DateTime<Utc>, key: &ShortKey) {
        self.by_long_url
            .entry(url.clone())
            .or_default()
            .insert((created_at, key.clone()));
    }

    fn unlink(&mut self, url: &LongUrl, created_at: DateTime<Utc>, key: &ShortKey) {
        if let Some(keys) = self.by_long_url.get_mut(url) {
            keys.remove(&(created_at, key.clone()));
            if keys.is_empty() {
                self.by_long_url.remove(url);
            }
        }
    }
}

/// In-memory record store
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included
    pub fn len(&self) -> usize {
        self.inner.read().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn save(&self, record: Record) -> StoreResult<()> {
        let mut tables = self.inner.write();
        if tables.by_key.contains_key(&record.short_key) {
            return Err(StoreError::Duplicate(record.short_key.to_string()));
        }

        tables.link(&record.long_url, record.created_at, &record.short_key);
        tables.by_key.insert(record.short_key.clone(), record);
        Ok(())
    }

    fn find_by_short_key(&self, key: &ShortKey) -> StoreResult<Record> {
        self.inner
            .read()
            .by_key
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn find_by_long_url(&self, url: &LongUrl) -> StoreResult<Record> {
        let tables = self.inner.read();
        tables
            .by_long_url
            .get(url)
            .and_then(|keys| keys.last())
            .and_then(|(_, k)| tables.by_key.get(k))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, record: &Record) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let stored = tables
            .by_key
            .get_mut(&record.short_key)
            .ok_or(StoreError::NotFound)?;

        let previous_url = std::mem::replace(&mut stored.long_url, record.long_url.clone());
        stored.expires_at = record.expires_at;
        stored.visit_count = record.visit_count.max(stored.visit_count);
        let created_at = stored.created_at;

        if previous_url != record.long_url {
            tables.unlink(&previous_url, created_at, &record.short_key);
            tables.link(&record.long_url, created_at, &record.short_key);
        }
        Ok(())
    }

    fn delete(&self, key: &ShortKey) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let removed = tables.by_key.remove(key).ok_or(StoreError::NotFound)?;
        tables.unlink(&removed.long_url, removed.created_at, &removed.short_key);
        Ok(())
    }

    fn exists_by_short_key(&self, key: &ShortKey) -> StoreResult<bool> {
        Ok(self.inner.read().by_key.contains_key(key))
    }

    fn increment_visit_count(&self, key: &ShortKey) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let record = tables.by_key.get_mut(key).ok_or(StoreError::NotFound)?;
        record.stamp_visit(Utc::now());
        Ok(())
    }

    fn find_expired_before(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Record>> {
        let tables = self.inner.read();
        let mut expired: Vec<Record> = tables
            .by_key
            .values()
            .filter(|r| r.expires_at.map(|t| t < cutoff).unwrap_or(false))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    fn delete_batch(&self, keys: &[ShortKey]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tables = self.inner.write();
        let mut deleted = 0;
        for key in keys {
            if let Some(removed) = tables.by_key.remove(key) {
                tables.unlink(&removed.long_url, removed.created_at, &removed.short_key);
                deleted += 1;
            }
        }

        debug!(requested = keys.len(), deleted, "Batch delete committed");
        Ok(deleted)
    }

    fn count_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<i64> {
        let count = self
            .inner
            .read()
            .by_key
            .values()
            .filter(|r| r.expires_at.map(|t| t < cutoff).unwrap_or(false))
            .count();
        Ok(count as i64)
    }
}
