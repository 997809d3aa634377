//! Visit Counter
//!
//! Atomic visit bookkeeping with a short dedup window that coalesces client
//! retries of the same logical visit. The window is an approximation: genuine
//! repeat visits inside it are undercounted.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::error::{Result, ShortenerError, StoreError};
use crate::model::ShortKey;
use crate::storage::RecordStore;

/// Counts visits against the record store
pub struct VisitCounter {
    store: Arc<dyn RecordStore>,
    /// key -> time of the last counted visit
    recent: DashMap<ShortKey, Instant>,
    window: Duration,
}

impl VisitCounter {
    pub fn new(store: Arc<dyn RecordStore>, window: Duration) -> Self {
        Self {
            store,
            recent: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Single atomic `visit_count + 1, last_accessed_at = now` at the store
    pub fn increment_and_stamp(&self, key: &ShortKey) -> Result<()> {
        self.store.increment_visit_count(key).map_err(|e| match e {
            StoreError::NotFound => ShortenerError::NotFound,
            other => ShortenerError::Internal(other.to_string()),
        })
    }

    /// Claim the visit slot for `key`. Returns false when the key was counted
    /// less than one window ago.
    pub fn should_count(&self, key: &ShortKey) -> bool {
        let now = Instant::now();
        match self.recent.entry(key.clone()) {
            Entry::Occupied(mut seen) => {
                let since = now.saturating_duration_since(*seen.get());
                if since < self.window {
                    trace!(key = %key, since = ?since, "Skipping duplicate visit");
                    false
                } else {
                    seen.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Deduplicated increment. `Ok(false)` means the visit was coalesced.
    pub fn record_visit(&self, key: &ShortKey) -> Result<bool> {
        if !self.should_count(key) {
            return Ok(false);
        }
        self.increment_and_stamp(key)?;
        Ok(true)
    }

    /// Forget keys last counted more than one window ago
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.recent.len();
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) < self.window);
        before.saturating_sub(self.recent.len())
    }

    /// Number of keys currently held in the dedup map
    pub fn tracked(&self) -> usize {
        self.recent.len()
    }
}

/// Handle to the background dedup-map pruner.
///
/// The pruner stops when the handle is dropped.
#[derive(Debug)]
pub struct DedupPruner {
    shutdown_tx: watch::Sender<bool>,
}

impl DedupPruner {
    /// Spawn the pruning loop on the current Tokio runtime
    pub fn start(counter: Arc<VisitCounter>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(prune_loop(counter, interval, shutdown_rx));
        info!(interval = ?interval, "Visit dedup pruner started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for DedupPruner {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn prune_loop(
    counter: Arc<VisitCounter>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Visit dedup pruner received shutdown signal");
                    return;
                }
            }
        }

        // yield so request tasks scheduled alongside us go first
        tokio::task::yield_now().await;

        let pruned = counter.prune();
        if pruned > 0 {
            debug!(pruned, tracked = counter.tracked(), "Pruned visit dedup map");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LongUrl, Record};
    use crate::storage::MemoryRecordStore;
    use std::thread;

    fn setup(window: Duration) -> (MemoryRecordStore, VisitCounter, ShortKey) {
        let store = MemoryRecordStore::new();
        let key = ShortKey::parse("visit").unwrap();
        store
            .save(Record::new(
                1,
                key.clone(),
                LongUrl::parse("https://example.com").unwrap(),
            ))
            .unwrap();
        let counter = VisitCounter::new(Arc::new(store.clone()), window);
        (store, counter, key)
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        for n in [1usize, 50, 100, 500] {
            let (store, counter, key) = setup(Duration::from_secs(3));
            let counter = Arc::new(counter);
            let initial = store.find_by_short_key(&key).unwrap().visit_count;

            let handles: Vec<_> = (0..n)
                .map(|_| {
                    let c = counter.clone();
                    let k = key.clone();
                    thread::spawn(move || c.increment_and_stamp(&k).unwrap())
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let record = store.find_by_short_key(&key).unwrap();
            assert_eq!(record.visit_count, initial + n as i64, "n = {}", n);
            assert!(record.last_accessed_at.unwrap() >= record.created_at);
        }
    }

    #[test]
    fn test_increment_missing_record() {
        let (_, counter, _) = setup(Duration::from_secs(3));
        let missing = ShortKey::parse("nope").unwrap();
        assert_eq!(counter.increment_and_stamp(&missing), Err(ShortenerError::NotFound));
    }

    #[test]
    fn test_dedup_window_coalesces_bursts() {
        let (store, counter, key) = setup(Duration::from_secs(3));

        assert!(counter.record_visit(&key).unwrap());
        assert!(!counter.record_visit(&key).unwrap());
        assert!(!counter.record_visit(&key).unwrap());

        assert_eq!(store.find_by_short_key(&key).unwrap().visit_count, 1);
    }

    #[test]
    fn test_visits_outside_window_count() {
        let (store, counter, key) = setup(Duration::from_millis(20));

        assert!(counter.record_visit(&key).unwrap());
        thread::sleep(Duration::from_millis(40));
        assert!(counter.record_visit(&key).unwrap());

        assert_eq!(store.find_by_short_key(&key).unwrap().visit_count, 2);
    }

    #[test]
    fn test_concurrent_burst_counts_once() {
        let (store, counter, key) = setup(Duration::from_secs(3));
        let counter = Arc::new(counter);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let c = counter.clone();
                let k = key.clone();
                thread::spawn(move || c.record_visit(&k).unwrap())
            })
            .collect();
        let counted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();

        assert_eq!(counted, 1);
        assert_eq!(store.find_by_short_key(&key).unwrap().visit_count, 1);
    }

    #[test]
    fn test_prune() {
        let (_, counter, key) = setup(Duration::from_millis(10));
        counter.should_count(&key);
        counter.should_count(&ShortKey::parse("other").unwrap());
        assert_eq!(counter.tracked(), 2);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.prune(), 2);
        assert_eq!(counter.tracked(), 0);
    }

    #[tokio::test]
    async fn test_pruner_task() {
        let (_, counter, key) = setup(Duration::from_millis(10));
        let counter = Arc::new(counter);
        counter.should_count(&key);

        let pruner = DedupPruner::start(counter.clone(), Duration::from_millis(15));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.tracked(), 0);
        drop(pruner);
    }
}
