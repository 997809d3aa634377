//! Server Module
//!
//! Wires the store, cache, shortener, visit counter and reaper together and
//! serves the HTTP API with axum.

use axum::Router;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::ApiRouter;
use crate::config::Config;
use crate::generator::{GeneratorError, GeneratorService};
use crate::metrics::Metrics;
use crate::observability::{HealthCheck, HealthStatus};
use crate::service::{DedupPruner, Reaper, Shortener, ShortenerSettings, VisitCounter};
use crate::storage::{CacheSweeper, MemoryCache, MemoryRecordStore, RecordStore};

/// Lazylink HTTP server
pub struct Server {
    config: Config,
    store: MemoryRecordStore,
    cache: MemoryCache,
    shortener: Arc<Shortener>,
    reaper: Arc<Reaper>,
    router: Router,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Build all components from the configuration
    pub fn new(config: Config) -> Result<Self, GeneratorError> {
        let store = MemoryRecordStore::new();
        let cache = MemoryCache::for_host();
        let metrics = Arc::new(Metrics::new());

        let generator = GeneratorService::snowflake(config.node_id)?;
        let visits = Arc::new(VisitCounter::new(
            Arc::new(store.clone()),
            config.dedup_window,
        ));

        let shortener = Arc::new(
            Shortener::new(
                ShortenerSettings::from(&config),
                Arc::new(store.clone()),
                Arc::new(cache.clone()),
                generator,
                visits,
            )
            .with_metrics(metrics.clone()),
        );

        let reaper = Arc::new(Reaper::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            config.cleanup.clone(),
        ));

        let health = build_health(&store, &cache, &reaper);
        let router = ApiRouter::new(shortener.clone())
            .with_reaper(reaper.clone())
            .with_health(health)
            .with_admin_api_key(config.admin_api_key.clone())
            .into_router();

        Ok(Self {
            config,
            store,
            cache,
            shortener,
            reaper,
            router,
            metrics,
        })
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr).await?;

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve connections on `listener` until `shutdown` resolves, then stop
    /// background tasks. In-flight requests and reaper batches are awaited.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, base_url = %self.config.base_url, "Lazylink server listening");

        if let Err(e) = self.reaper.start() {
            error!(error = %e, "Failed to start expired record reaper");
        }
        let sweeper = CacheSweeper::spawn(self.cache.clone(), self.config.cache_sweep_interval);
        let pruner = DedupPruner::start(
            self.shortener.visits().clone(),
            self.config.dedup_prune_interval,
        );

        let served = axum::serve(listener, self.router.clone().into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received");
            })
            .await;
        if let Err(e) = &served {
            error!(error = %e, "HTTP server failed");
        }

        pruner.stop();
        sweeper.abort();
        if self.reaper.is_running() {
            if let Err(e) = self.reaper.stop().await {
                warn!(error = %e, "Reaper stop failed");
            }
        }

        info!("Lazylink server stopped");
        served
    }

    pub fn store(&self) -> &MemoryRecordStore {
        &self.store
    }

    pub fn shortener(&self) -> &Arc<Shortener> {
        &self.shortener
    }

    pub fn reaper(&self) -> &Arc<Reaper> {
        &self.reaper
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

fn build_health(store: &MemoryRecordStore, cache: &MemoryCache, reaper: &Arc<Reaper>) -> HealthCheck {
    let mut health = HealthCheck::new();

    let store = store.clone();
    health.register("store", move || match store.count_expired_before(Utc::now()) {
        Ok(expired) => (
            HealthStatus::Healthy,
            Some(format!("{} records, {} expired", store.len(), expired)),
        ),
        Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
    });

    let cache = cache.clone();
    health.register("cache", move || {
        (HealthStatus::Healthy, Some(format!("{} entries", cache.len())))
    });

    let reaper = reaper.clone();
    health.register("reaper", move || {
        let stats = reaper.stats();
        if !reaper.config().enabled {
            (HealthStatus::Healthy, Some("disabled".to_string()))
        } else if !reaper.is_running() {
            (HealthStatus::Degraded, Some("not running".to_string()))
        } else if stats.failed_runs > 0 && stats.successful_runs == 0 {
            (HealthStatus::Degraded, Some(format!("{} failed runs", stats.failed_runs)))
        } else {
            (HealthStatus::Healthy, None)
        }
    });

    health
}
