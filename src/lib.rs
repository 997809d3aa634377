//! Lazylink - URL Shortener with Lazy Expiration
//!
//! Expired links are rejected on read without being deleted, remembered in the
//! cache as tombstones, and physically removed later by a background reaper.
//! Visits are counted atomically with a short dedup window.

pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod server;
pub mod service;
pub mod storage;

pub use api::{ApiError, ApiRouter};
pub use config::{CleanupConfig, Config};
pub use error::{CacheError, ReaperError, ShortenerError, StoreError};
pub use metrics::Metrics;
pub use model::{LongUrl, Record, ShortKey};
pub use observability::HealthCheck;
pub use server::Server;
pub use service::{CleanupStats, Reaper, ShortenRequest, ShortenResponse, Shortener, UrlStats, VisitCounter};
pub use storage::{CacheEntry, EntryCache, MemoryCache, MemoryRecordStore, RecordStore, TombstoneReason};
