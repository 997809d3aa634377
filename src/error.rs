//! Error Types
//!
//! One error enum per layer: store, cache, reaper and the shortener use case.

use thiserror::Error;

/// Errors raised by a [`RecordStore`](crate::storage::RecordStore)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("short key already exists: {0}")]
    Duplicate(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by an [`EntryCache`](crate::storage::EntryCache)
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by the background reaper
#[derive(Error, Debug)]
pub enum ReaperError {
    #[error("cleanup service is already running")]
    AlreadyRunning,
    #[error("cleanup service is not running")]
    NotRunning,
    #[error("cleanup service must be started inside a Tokio runtime")]
    NoRuntime,
    #[error("invalid cleanup configuration: {0}")]
    InvalidConfig(String),
    #[error("cleanup batch failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the shortener use case
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortenerError {
    /// Key never existed, was reaped, or is negatively cached as deleted
    #[error("URL not found")]
    NotFound,
    /// Key exists but is past its expiration
    #[error("URL has expired")]
    Expired,
    #[error("custom short key already exists: {0}")]
    Conflict(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid short key: {0}")]
    InvalidKey(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShortenerError {
    /// Machine-readable error code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ShortenerError::NotFound => "not_found",
            ShortenerError::Expired => "url_expired",
            ShortenerError::Conflict(_) => "conflict",
            ShortenerError::InvalidUrl(_) => "invalid_url",
            ShortenerError::InvalidKey(_) => "invalid_short_key",
            ShortenerError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status the boundary renders for this error
    pub fn status(&self) -> u16 {
        match self {
            ShortenerError::NotFound => 404,
            ShortenerError::Expired => 410,
            ShortenerError::Conflict(_) => 409,
            ShortenerError::InvalidUrl(_) | ShortenerError::InvalidKey(_) => 400,
            ShortenerError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShortenerError>;
