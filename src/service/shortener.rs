//! Shortener Use Case
//!
//! Creates links and resolves them with lazy validation: expiration is a
//! logical property checked on every read, never enforced by deleting on the
//! read path.
//!
//! ## Resolve
//!
//! ```text
//!  cache ──tombstone──────────────> Expired | NotFound
//!    │ ──live, logically expired──> write tombstone, Expired
//!    │ ──live──────────────────────────────────────────────> URL
//!    ▼ miss / cache error
//!  store ──missing───────────────> tombstone(deleted), NotFound
//!        ──expired───────────────> tombstone(expired), Expired
//!        ──valid─────────────────> cache entry ───────────> URL
//! ```
//!
//! Every successful resolution passes through the visit counter.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dto::{ShortenRequest, ShortenResponse, UrlStats};
use super::VisitCounter;
use crate::config::Config;
use crate::error::{Result, ShortenerError, StoreError};
use crate::generator::GeneratorService;
use crate::metrics::{Metrics, ResolveOutcome};
use crate::model::{LongUrl, Record, ShortKey};
use crate::storage::{CacheEntry, EntryCache, RecordStore, TombstoneReason};

/// Tunables of the shortener, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ShortenerSettings {
    pub base_url: String,
    pub default_link_ttl: Duration,
    /// Ceiling on the cache TTL of live entries
    pub cache_ttl: Duration,
    /// Floor on the cache TTL of live entries
    pub min_cache_ttl: Duration,
    pub tombstone_ttl: Duration,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ShortenerSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            default_link_ttl: config.default_link_ttl,
            cache_ttl: config.cache_ttl,
            min_cache_ttl: config.min_cache_ttl,
            tombstone_ttl: config.tombstone_ttl,
        }
    }
}

/// Link creation, resolution and statistics
pub struct Shortener {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn EntryCache>,
    generator: GeneratorService,
    visits: Arc<VisitCounter>,
    metrics: Arc<Metrics>,
    settings: ShortenerSettings,
}

impl Shortener {
    pub fn new(
        settings: ShortenerSettings,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn EntryCache>,
        generator: GeneratorService,
        visits: Arc<VisitCounter>,
    ) -> Self {
        Self {
            store,
            cache,
            generator,
            visits,
            metrics: Arc::new(Metrics::new()),
            settings,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn visits(&self) -> &Arc<VisitCounter> {
        &self.visits
    }

    pub fn settings(&self) -> &ShortenerSettings {
        &self.settings
    }

    /// Create a short link, or return the live link already mapped to the
    /// same URL when no custom key is requested.
    pub fn shorten(&self, request: &ShortenRequest) -> Result<ShortenResponse> {
        let long_url = LongUrl::from_user_input(&request.long_url)?;
        let custom_key = request.custom_key.as_deref().filter(|k| !k.is_empty());

        if custom_key.is_none() {
            if let Some(existing) = self.find_live_by_url(&long_url) {
                debug!(key = %existing.short_key, "Reusing existing short link");
                return Ok(ShortenResponse::from_record(&self.settings.base_url, &existing, true));
            }
        }

        let (short_key, id) = match custom_key {
            Some(raw) => self.claim_custom_key(raw)?,
            None => self
                .generator
                .generate_short_key()
                .map_err(|e| ShortenerError::Internal(e.to_string()))?,
        };

        let ttl = match request.ttl_seconds {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => self.settings.default_link_ttl,
        };
        let record = Record::new(id, short_key, long_url).with_ttl(ttl);

        self.store.save(record.clone()).map_err(|e| match e {
            StoreError::Duplicate(key) => ShortenerError::Conflict(key),
            other => ShortenerError::Internal(other.to_string()),
        })?;

        self.seed_cache(&record);

        info!(
            key = %record.short_key,
            expires_at = ?record.expires_at,
            "Created short link"
        );
        Ok(ShortenResponse::from_record(&self.settings.base_url, &record, false))
    }

    /// Resolve a key to its long URL, counting the visit on success
    pub fn resolve(&self, raw_key: &str) -> Result<String> {
        let key = ShortKey::parse(raw_key)?;

        let resolved = match self.resolve_from_cache(&key) {
            Ok(Some(url)) => Ok(url),
            Ok(None) => self.resolve_from_store(&key),
            Err(e) => Err(e),
        };

        match &resolved {
            Ok(_) => self.count_visit(&key),
            Err(ShortenerError::Expired) => self.metrics.record_expired(),
            Err(ShortenerError::NotFound) => self.metrics.record_not_found(),
            Err(_) => {}
        }
        resolved
    }

    /// Statistics of a live link
    pub fn stats(&self, raw_key: &str) -> Result<UrlStats> {
        let key = ShortKey::parse(raw_key)?;
        let record = self.lookup(&key)?;
        if record.is_expired() {
            return Err(ShortenerError::Expired);
        }
        Ok(record.into())
    }

    /// Cache TTL for a live entry: time left until expiration, capped at the
    /// configured ceiling and never below the floor.
    pub fn cache_ttl_for(&self, record: &Record) -> Duration {
        let Some(expires_at) = record.expires_at else {
            return self.settings.cache_ttl;
        };
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        remaining
            .min(self.settings.cache_ttl)
            .max(self.settings.min_cache_ttl)
    }

    /// `Ok(None)` on a miss; cache failures are treated as misses
    fn resolve_from_cache(&self, key: &ShortKey) -> Result<Option<String>> {
        let entry = match self.cache.get_entry(key.as_str()) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling back to store");
                return Ok(None);
            }
        };

        if entry.is_tombstone {
            self.metrics.record_resolve(ResolveOutcome::TombstoneHit);
            return Err(match entry.reason {
                Some(TombstoneReason::Expired) => ShortenerError::Expired,
                _ => ShortenerError::NotFound,
            });
        }

        self.metrics.record_resolve(ResolveOutcome::CacheHit);

        // the cache TTL should have evicted this already; clock skew or a
        // misconfigured TTL can still hand us a stale entry
        if entry.is_expired() {
            self.write_tombstone(key, TombstoneReason::Expired);
            return Err(ShortenerError::Expired);
        }

        Ok(Some(entry.long_url))
    }

    fn resolve_from_store(&self, key: &ShortKey) -> Result<String> {
        self.metrics.record_resolve(ResolveOutcome::StoreLookup);

        let record = match self.store.find_by_short_key(key) {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                self.write_tombstone(key, TombstoneReason::Deleted);
                return Err(ShortenerError::NotFound);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Store lookup failed");
                return Err(ShortenerError::NotFound);
            }
        };

        // physical deletion belongs to the reaper
        if record.is_expired() {
            self.write_tombstone(key, TombstoneReason::Expired);
            return Err(ShortenerError::Expired);
        }

        let ttl = self.cache_ttl_for(&record);
        let entry = CacheEntry::live(record.long_url.as_str(), record.expires_at);
        if let Err(e) = self.cache.set_entry(key.as_str(), &entry, ttl) {
            warn!(key = %key, error = %e, "Failed to repopulate cache");
        }

        Ok(record.long_url.to_string())
    }

    fn count_visit(&self, key: &ShortKey) {
        match self.visits.record_visit(key) {
            Ok(counted) => self.metrics.record_visit(counted),
            Err(e) => warn!(key = %key, error = %e, "Failed to record visit"),
        }
    }

    fn write_tombstone(&self, key: &ShortKey, reason: TombstoneReason) {
        if let Err(e) = self
            .cache
            .set_tombstone(key.as_str(), reason, self.settings.tombstone_ttl)
        {
            warn!(key = %key, %reason, error = %e, "Failed to write tombstone");
        }
    }

    fn seed_cache(&self, record: &Record) {
        let ttl = self.cache_ttl_for(record);
        let key = record.short_key.as_str();
        let entry = CacheEntry::live(record.long_url.as_str(), record.expires_at);

        if let Err(e) = self.cache.set_entry(key, &entry, ttl) {
            warn!(key, error = %e, "Failed to cache structured entry, trying plain value");
            if let Err(e) = self.cache.set(key, record.long_url.as_str(), ttl) {
                warn!(key, error = %e, "Plain cache write failed too");
            }
        }
    }

    fn claim_custom_key(&self, raw: &str) -> Result<(ShortKey, i64)> {
        let key = ShortKey::parse(raw)?;

        let taken = self
            .store
            .exists_by_short_key(&key)
            .map_err(|e| ShortenerError::Internal(e.to_string()))?;
        if taken {
            return Err(ShortenerError::Conflict(key.to_string()));
        }

        let id = self
            .generator
            .generate_id()
            .map_err(|e| ShortenerError::Internal(e.to_string()))?;
        Ok((key, id))
    }

    fn find_live_by_url(&self, long_url: &LongUrl) -> Option<Record> {
        match self.store.find_by_long_url(long_url) {
            Ok(record) if !record.is_expired() => Some(record),
            Ok(_) | Err(StoreError::NotFound) => None,
            Err(e) => {
                warn!(error = %e, "Existing link lookup failed");
                None
            }
        }
    }

    /// Point lookup; store errors surface as `NotFound` after logging
    fn lookup(&self, key: &ShortKey) -> Result<Record> {
        self.store.find_by_short_key(key).map_err(|e| {
            if e != StoreError::NotFound {
                warn!(key = %key, error = %e, "Store lookup failed");
            }
            ShortenerError::NotFound
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, CacheResult, StoreResult};
    use crate::storage::{MemoryCache, MemoryRecordStore};
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Store wrapper that counts the calls made against it
    #[derive(Default)]
    struct SpyStore {
        inner: MemoryRecordStore,
        finds: AtomicUsize,
        deletes: AtomicUsize,
        fail_lookups: AtomicBool,
    }

    impl SpyStore {
        fn finds(&self) -> usize {
            self.finds.load(Ordering::SeqCst)
        }

        fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    impl RecordStore for SpyStore {
        fn save(&self, record: Record) -> StoreResult<()> {
            self.inner.save(record)
        }
        fn find_by_short_key(&self, key: &ShortKey) -> StoreResult<Record> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("timeout".into()));
            }
            self.inner.find_by_short_key(key)
        }
        fn find_by_long_url(&self, url: &LongUrl) -> StoreResult<Record> {
            self.inner.find_by_long_url(url)
        }
        fn update(&self, record: &Record) -> StoreResult<()> {
            self.inner.update(record)
        }
        fn delete(&self, key: &ShortKey) -> StoreResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key)
        }
        fn exists_by_short_key(&self, key: &ShortKey) -> StoreResult<bool> {
            self.inner.exists_by_short_key(key)
        }
        fn increment_visit_count(&self, key: &ShortKey) -> StoreResult<()> {
            self.inner.increment_visit_count(key)
        }
        fn find_expired_before(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Record>> {
            self.inner.find_expired_before(cutoff, limit)
        }
        fn delete_batch(&self, keys: &[ShortKey]) -> StoreResult<usize> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_batch(keys)
        }
        fn count_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<i64> {
            self.inner.count_expired_before(cutoff)
        }
    }

    /// Cache whose every operation fails
    struct DownCache;

    impl EntryCache for DownCache {
        fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Backend("connection refused".into()))
        }
        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Backend("connection refused".into()))
        }
        fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Backend("connection refused".into()))
        }
        fn exists(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    struct Fixture {
        store: Arc<SpyStore>,
        cache: MemoryCache,
        shortener: Shortener,
    }

    fn fixture_with(window: Duration) -> Fixture {
        let store = Arc::new(SpyStore::default());
        let cache = MemoryCache::new();
        let visits = Arc::new(VisitCounter::new(store.clone(), window));
        let shortener = Shortener::new(
            ShortenerSettings::default(),
            store.clone(),
            Arc::new(cache.clone()),
            GeneratorService::snowflake(1).unwrap(),
            visits,
        );
        Fixture {
            store,
            cache,
            shortener,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Duration::from_secs(3))
    }

    fn insert(store: &SpyStore, key: &str, expires_at: Option<DateTime<Utc>>) {
        store
            .inner
            .save(
                Record::new(
                    1,
                    ShortKey::parse(key).unwrap(),
                    LongUrl::parse(&format!("https://{}.example.com", key)).unwrap(),
                )
                .with_expires_at(expires_at),
            )
            .unwrap();
    }

    fn visit_count(store: &SpyStore, key: &str) -> i64 {
        store
            .inner
            .find_by_short_key(&ShortKey::parse(key).unwrap())
            .unwrap()
            .visit_count
    }

    #[test]
    fn test_expired_record_is_not_deleted_on_read() {
        let f = fixture();
        insert(&f.store, "old", Some(Utc::now() - ChronoDuration::minutes(5)));

        assert_eq!(f.shortener.resolve("old"), Err(ShortenerError::Expired));
        assert_eq!(f.store.deletes(), 0);
        assert!(f.store.inner.exists_by_short_key(&ShortKey::parse("old").unwrap()).unwrap());

        let tombstone = f.cache.get_entry("old").unwrap().unwrap();
        assert!(tombstone.is_tombstone);
        assert_eq!(tombstone.reason, Some(TombstoneReason::Expired));
    }

    #[test]
    fn test_tombstone_short_circuits_store() {
        let f = fixture();
        insert(&f.store, "hot", Some(Utc::now() - ChronoDuration::minutes(1)));

        assert_eq!(f.shortener.resolve("hot"), Err(ShortenerError::Expired));
        assert_eq!(f.store.finds(), 1);

        for _ in 0..10 {
            assert_eq!(f.shortener.resolve("hot"), Err(ShortenerError::Expired));
        }
        assert_eq!(f.store.finds(), 1);
        assert_eq!(f.shortener.metrics().tombstone_hits(), 10);
    }

    #[test]
    fn test_missing_key_is_negatively_cached() {
        let f = fixture();

        assert_eq!(f.shortener.resolve("ghost"), Err(ShortenerError::NotFound));
        assert_eq!(f.shortener.resolve("ghost"), Err(ShortenerError::NotFound));
        assert_eq!(f.store.finds(), 1);

        let tombstone = f.cache.get_entry("ghost").unwrap().unwrap();
        assert_eq!(tombstone.reason, Some(TombstoneReason::Deleted));
    }

    #[test]
    fn test_valid_record_resolves_and_populates_cache() {
        let f = fixture_with(Duration::from_millis(1));
        insert(&f.store, "live", Some(Utc::now() + ChronoDuration::hours(2)));

        assert_eq!(f.shortener.resolve("live").unwrap(), "https://live.example.com");
        assert_eq!(f.store.finds(), 1);

        let entry = f.cache.get_entry("live").unwrap().unwrap();
        assert!(!entry.is_tombstone);
        assert_eq!(entry.long_url, "https://live.example.com");

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(f.shortener.resolve("live").unwrap(), "https://live.example.com");
        // second read served from cache
        assert_eq!(f.store.finds(), 1);
        assert_eq!(visit_count(&f.store, "live"), 2);
    }

    #[test]
    fn test_never_expiring_record_resolves() {
        let f = fixture_with(Duration::from_millis(1));
        insert(&f.store, "forever", None);

        for _ in 0..3 {
            assert!(f.shortener.resolve("forever").is_ok());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(visit_count(&f.store, "forever"), 3);
    }

    #[test]
    fn test_rapid_repeat_visits_are_deduplicated() {
        let f = fixture();
        insert(&f.store, "burst", None);

        for _ in 0..5 {
            f.shortener.resolve("burst").unwrap();
        }
        assert_eq!(visit_count(&f.store, "burst"), 1);
        assert_eq!(f.shortener.metrics().visits_deduplicated(), 4);
    }

    #[test]
    fn test_stale_cache_entry_is_revalidated() {
        let f = fixture();
        insert(&f.store, "skew", Some(Utc::now() + ChronoDuration::hours(1)));

        // cache still holds an entry whose logical expiration has passed
        let stale = CacheEntry::live("https://skew.example.com", Some(Utc::now() - ChronoDuration::seconds(1)));
        f.cache.set_entry("skew", &stale, Duration::from_secs(600)).unwrap();

        assert_eq!(f.shortener.resolve("skew"), Err(ShortenerError::Expired));
        assert_eq!(f.store.finds(), 0);
        assert_eq!(f.store.deletes(), 0);
        assert!(f.cache.get_entry("skew").unwrap().unwrap().is_tombstone);
    }

    #[test]
    fn test_cache_failure_falls_back_to_store() {
        let store = Arc::new(SpyStore::default());
        insert(&store, "solid", None);
        let visits = Arc::new(VisitCounter::new(store.clone(), Duration::from_secs(3)));
        let shortener = Shortener::new(
            ShortenerSettings::default(),
            store.clone(),
            Arc::new(DownCache),
            GeneratorService::snowflake(1).unwrap(),
            visits,
        );

        assert_eq!(shortener.resolve("solid").unwrap(), "https://solid.example.com");
        assert_eq!(shortener.resolve("missing"), Err(ShortenerError::NotFound));
        assert_eq!(store.finds(), 2);

        // shorten still succeeds with the cache down
        let created = shortener
            .shorten(&ShortenRequest::new("https://down.example.com"))
            .unwrap();
        assert!(!created.reused);
    }

    #[test]
    fn test_store_error_surfaces_as_not_found_without_tombstone() {
        let f = fixture();
        insert(&f.store, "flaky", None);
        f.store.fail_lookups.store(true, Ordering::SeqCst);

        assert_eq!(f.shortener.resolve("flaky"), Err(ShortenerError::NotFound));
        assert!(f.cache.get_entry("flaky").unwrap().is_none());

        f.store.fail_lookups.store(false, Ordering::SeqCst);
        assert!(f.shortener.resolve("flaky").is_ok());
    }

    #[test]
    fn test_invalid_key_rejected() {
        let f = fixture();
        assert!(matches!(f.shortener.resolve("bad/key"), Err(ShortenerError::InvalidKey(_))));
        assert_eq!(f.store.finds(), 0);
    }

    #[test]
    fn test_shorten_defaults_to_one_day() {
        let f = fixture();
        let before = Utc::now();
        let resp = f
            .shortener
            .shorten(&ShortenRequest::new("example.com/page"))
            .unwrap();

        assert_eq!(resp.long_url, "https://example.com/page");
        assert!(resp.short_url.ends_with(&format!("/{}", resp.short_key)));
        let expires = resp.expires_at.unwrap();
        let expected = before + ChronoDuration::hours(24);
        assert!((expires - expected).num_seconds().abs() <= 5);

        let stats = f.shortener.stats(&resp.short_key).unwrap();
        assert_eq!(stats.visit_count, 0);
        assert!(stats.last_accessed_at.is_none());
    }

    #[test]
    fn test_shorten_custom_ttl_and_key() {
        let f = fixture();
        let resp = f
            .shortener
            .shorten(
                &ShortenRequest::new("https://custom.example.com")
                    .with_custom_key("mine")
                    .with_ttl_seconds(120),
            )
            .unwrap();
        assert_eq!(resp.short_key, "mine");
        let remaining = resp.expires_at.unwrap() - Utc::now();
        assert!(remaining <= ChronoDuration::seconds(120));
        assert!(remaining > ChronoDuration::seconds(100));

        // seeded cache entry answers the first resolve
        assert_eq!(f.shortener.resolve("mine").unwrap(), "https://custom.example.com");
        assert_eq!(f.store.finds(), 0);
    }

    #[test]
    fn test_custom_key_conflict() {
        let f = fixture();
        f.shortener
            .shorten(&ShortenRequest::new("https://a.com").with_custom_key("taken"))
            .unwrap();
        let err = f
            .shortener
            .shorten(&ShortenRequest::new("https://b.com").with_custom_key("taken"))
            .unwrap_err();
        assert_eq!(err, ShortenerError::Conflict("taken".into()));
    }

    #[test]
    fn test_shorten_reuses_live_mapping() {
        let f = fixture();
        let first = f.shortener.shorten(&ShortenRequest::new("https://same.com")).unwrap();
        let second = f.shortener.shorten(&ShortenRequest::new("https://same.com")).unwrap();
        assert_eq!(first.short_key, second.short_key);
        assert!(second.reused);
    }

    #[test]
    fn test_shorten_rejects_bad_input() {
        let f = fixture();
        assert!(matches!(
            f.shortener.shorten(&ShortenRequest::new("")),
            Err(ShortenerError::InvalidUrl(_))
        ));
        assert!(matches!(
            f.shortener
                .shorten(&ShortenRequest::new("https://ok.com").with_custom_key("no spaces")),
            Err(ShortenerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_stats_of_expired_link() {
        let f = fixture();
        insert(&f.store, "stale", Some(Utc::now() - ChronoDuration::hours(1)));
        assert_eq!(f.shortener.stats("stale"), Err(ShortenerError::Expired));
        assert_eq!(f.shortener.stats("nothing"), Err(ShortenerError::NotFound));
    }

    #[test]
    fn test_cache_ttl_bounds() {
        let f = fixture();
        let base = Record::new(
            1,
            ShortKey::parse("ttl").unwrap(),
            LongUrl::parse("https://ttl.com").unwrap(),
        );

        let never = base.clone();
        assert_eq!(f.shortener.cache_ttl_for(&never), Duration::from_secs(86_400));

        let far = base.clone().with_expires_at(Some(Utc::now() + ChronoDuration::days(30)));
        assert_eq!(f.shortener.cache_ttl_for(&far), Duration::from_secs(86_400));

        let soon = base.clone().with_expires_at(Some(Utc::now() + ChronoDuration::seconds(5)));
        assert_eq!(f.shortener.cache_ttl_for(&soon), Duration::from_secs(60));

        let past = base.clone().with_expires_at(Some(Utc::now() - ChronoDuration::hours(1)));
        assert_eq!(f.shortener.cache_ttl_for(&past), Duration::from_secs(60));

        let mid = base.with_expires_at(Some(Utc::now() + ChronoDuration::hours(2)));
        let ttl = f.shortener.cache_ttl_for(&mid);
        assert!(ttl <= Duration::from_secs(7200) && ttl > Duration::from_secs(7100));
    }
}
