//! Storage Layer
//!
//! Record store and entry cache contracts with in-memory implementations.

mod cache_sweeper;
mod entry_cache;
mod memory_cache;
mod record_store;

pub use cache_sweeper::CacheSweeper;
pub use entry_cache::{CacheEntry, EntryCache, TombstoneReason};
pub use memory_cache::MemoryCache;
pub use record_store::{MemoryRecordStore, RecordStore};
