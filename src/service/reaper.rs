//! Background Reaper
//!
//! Physically deletes records whose expiration lies more than `buffer_time`
//! in the past, in bounded batches, then evicts their cache keys best-effort.
//! The read path never deletes; this task is the only reclaimer of expired
//! records.
//!
//! ## Lifecycle
//!
//! ```text
//!   Stopped ──start()──> Running ──stop().await──> Stopped
//! ```
//!
//! Both transitions are compare-and-swap guarded under the task lock, so a
//! second `start` or `stop` fails with an error instead of corrupting state,
//! and a `stop` racing a `start` always finds the spawned task. Several reapers
//! (one per replica) may run against the same store: batch deletes are
//! idempotent at the row-set level.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CleanupConfig;
use crate::error::{ReaperError, StoreError};
use crate::model::ShortKey;
use crate::storage::{EntryCache, RecordStore};

/// Smoothing factor of the cleanup-duration moving average
const EMA_ALPHA: f64 = 0.1;

/// Reaper statistics, handed out as snapshot copies
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupStats {
    pub last_cleanup_time: Option<DateTime<Utc>>,
    pub total_cleaned: u64,
    pub last_batch_size: usize,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Exponential moving average of batch duration
    pub average_cleanup_ms: f64,
    pub is_running: bool,
}

/// State shared between the reaper handle and its background task
struct ReaperCore {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn EntryCache>,
    config: CleanupConfig,
    stats: RwLock<CleanupStats>,
}

impl ReaperCore {
    fn cutoff(&self) -> DateTime<Utc> {
        let buffer = ChronoDuration::from_std(self.config.buffer_time)
            .unwrap_or_else(|_| ChronoDuration::days(36_500));
        Utc::now() - buffer
    }

    fn cleanup_expired_batch(&self, batch_size: usize) -> Result<usize, ReaperError> {
        let start = Instant::now();
        let cutoff = self.cutoff();

        debug!(cutoff = %cutoff, batch_size, "Starting batch cleanup");

        let expired = match self.store.find_expired_before(cutoff, batch_size) {
            Ok(expired) => expired,
            Err(e) => return Err(self.fail(e, start)),
        };

        if expired.is_empty() {
            self.update_stats(Ok(0), start.elapsed());
            return Ok(0);
        }

        let keys: Vec<ShortKey> = expired.into_iter().map(|r| r.short_key).collect();
        debug!(found = keys.len(), "Found expired records to delete");

        let deleted = match self.store.delete_batch(&keys) {
            Ok(deleted) => deleted,
            Err(e) => return Err(self.fail(e, start)),
        };
        if deleted < keys.len() {
            info!(
                requested = keys.len(),
                deleted,
                "Some expired records were already removed by another reaper"
            );
        }

        evict_best_effort(self.cache.as_ref(), &keys);

        self.update_stats(Ok(deleted), start.elapsed());
        info!(deleted, elapsed = ?start.elapsed(), "Deleted expired records");
        Ok(deleted)
    }

    fn fail(&self, e: StoreError, start: Instant) -> ReaperError {
        self.update_stats(Err(()), start.elapsed());
        ReaperError::Store(e)
    }

    fn update_stats(&self, outcome: Result<usize, ()>, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut stats = self.stats.write();

        stats.average_cleanup_ms = if stats.successful_runs + stats.failed_runs == 0 {
            elapsed_ms
        } else {
            EMA_ALPHA * elapsed_ms + (1.0 - EMA_ALPHA) * stats.average_cleanup_ms
        };
        stats.last_cleanup_time = Some(Utc::now());

        match outcome {
            Ok(cleaned) => {
                stats.last_batch_size = cleaned;
                stats.total_cleaned += cleaned as u64;
                stats.successful_runs += 1;
            }
            Err(()) => {
                stats.last_batch_size = 0;
                stats.failed_runs += 1;
            }
        }
    }
}

/// Evict reaped keys from the cache. Failures are logged and never retried;
/// the cache TTL is the fallback.
fn evict_best_effort(cache: &dyn EntryCache, keys: &[ShortKey]) -> usize {
    let mut failed = 0;
    for key in keys {
        if let Err(e) = cache.delete(key.as_str()) {
            failed += 1;
            warn!(key = %key, error = %e, "Failed to evict reaped key from cache");
        }
    }
    if failed > 0 {
        warn!(failed, total = keys.len(), "Cache eviction after cleanup was partial");
    }
    failed
}

struct ReaperTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic, single-flight cleanup of expired records
pub struct Reaper {
    core: Arc<ReaperCore>,
    running: AtomicBool,
    task: Mutex<Option<ReaperTask>>,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn EntryCache>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            core: Arc::new(ReaperCore {
                store,
                cache,
                config,
                stats: RwLock::new(CleanupStats::default()),
            }),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.core.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the periodic loop on the current Tokio runtime.
    ///
    /// A disabled reaper logs and returns `Ok` without starting.
    pub fn start(&self) -> Result<(), ReaperError> {
        if !self.core.config.enabled {
            info!("Cleanup service is disabled");
            return Ok(());
        }
        self.core
            .config
            .validate()
            .map_err(ReaperError::InvalidConfig)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ReaperError::NoRuntime)?;

        // held until the task is stored so a concurrent stop sees it
        let mut task = self.task.lock();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReaperError::AlreadyRunning);
        }

        info!(
            interval = ?self.core.config.interval,
            batch_size = self.core.config.batch_size,
            buffer = ?self.core.config.buffer_time,
            "Starting expired record reaper"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(reaper_loop(self.core.clone(), shutdown_rx));
        *task = Some(ReaperTask {
            shutdown_tx,
            handle,
        });
        self.core.stats.write().is_running = true;

        Ok(())
    }

    /// Signal the loop to stop and wait for any in-flight batch to finish
    pub async fn stop(&self) -> Result<(), ReaperError> {
        let task = {
            let mut task = self.task.lock();
            if self
                .running
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(ReaperError::NotRunning);
            }
            self.core.stats.write().is_running = false;
            task.take()
        };

        info!("Stopping expired record reaper");

        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            if let Err(e) = task.handle.await {
                error!(error = %e, "Reaper task terminated abnormally");
            }
        }

        info!("Expired record reaper stopped");
        Ok(())
    }

    /// Run one cleanup batch now. Store errors propagate and count as a
    /// failed run; cache eviction errors are only logged.
    pub fn cleanup_expired_batch(&self, batch_size: usize) -> Result<usize, ReaperError> {
        self.core.cleanup_expired_batch(batch_size)
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> CleanupStats {
        self.core.stats.read().clone()
    }

    /// Records currently eligible for deletion
    pub fn pending_count(&self) -> Result<i64, ReaperError> {
        Ok(self.core.store.count_expired_before(self.core.cutoff())?)
    }
}

async fn reaper_loop(core: Arc<ReaperCore>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = core.config.interval;
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // a batch that outlived max_cleanup_duration and is still running
    let mut in_flight: Option<JoinHandle<Result<usize, ReaperError>>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    break;
                }
                continue;
            }
        }

        if let Some(job) = in_flight.take() {
            if !job.is_finished() {
                warn!("Previous cleanup batch still running, skipping tick");
                in_flight = Some(job);
                continue;
            }
            log_outcome(job.await);
        }

        let worker = core.clone();
        let batch_size = core.config.batch_size;
        let mut job = tokio::task::spawn_blocking(move || worker.cleanup_expired_batch(batch_size));

        match tokio::time::timeout(core.config.max_cleanup_duration, &mut job).await {
            Ok(joined) => log_outcome(joined),
            Err(_) => {
                warn!(
                    max = ?core.config.max_cleanup_duration,
                    "Cleanup batch exceeded its time budget, letting it finish in the background"
                );
                in_flight = Some(job);
            }
        }
    }

    if let Some(job) = in_flight {
        log_outcome(job.await);
    }
}

fn log_outcome(joined: Result<Result<usize, ReaperError>, JoinError>) {
    match joined {
        Ok(Ok(0)) => debug!("No expired records eligible for cleanup"),
        Ok(Ok(cleaned)) => info!(cleaned, "Cleaned up expired records"),
        Ok(Err(e)) => error!(error = %e, "Cleanup batch failed"),
        Err(e) => error!(error = %e, "Cleanup batch panicked"),
    }
}
