//! Request and response payloads of the shortener use case

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Record;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ShortenRequest {
    pub long_url: String,
    #[serde(default)]
    pub custom_key: Option<String>,
    /// Link lifetime; absent or zero means the default lifetime
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl ShortenRequest {
    pub fn new(long_url: impl Into<String>) -> Self {
        Self {
            long_url: long_url.into(),
            ..Default::default()
        }
    }

    pub fn with_custom_key(mut self, key: impl Into<String>) -> Self {
        self.custom_key = Some(key.into());
        self
    }

    pub fn with_ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortenResponse {
    pub short_url: String,
    pub short_key: String,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// An existing live mapping was returned instead of a new one
    #[serde(skip)]
    pub reused: bool,
}

impl ShortenResponse {
    pub(crate) fn from_record(base_url: &str, record: &Record, reused: bool) -> Self {
        Self {
            short_url: format!("{}/{}", base_url, record.short_key),
            short_key: record.short_key.to_string(),
            long_url: record.long_url.to_string(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            reused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlStats {
    pub short_key: String,
    pub long_url: String,
    pub visit_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl From<Record> for UrlStats {
    fn from(record: Record) -> Self {
        Self {
            short_key: record.short_key.to_string(),
            long_url: record.long_url.to_string(),
            visit_count: record.visit_count,
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_accessed_at: record.last_accessed_at,
        }
    }
}
