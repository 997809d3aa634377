//! Link Record
//!
//! The store-owned mapping from short key to long URL.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LongUrl, ShortKey};

/// Persisted short link with expiration and visit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub short_key: ShortKey,
    pub long_url: LongUrl,
    pub created_at: DateTime<Utc>,
    /// `None` means the link never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub visit_count: i64,
    /// Set on the first successful visit increment
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Create a fresh, never-visited record
    pub fn new(id: i64, short_key: ShortKey, long_url: LongUrl) -> Self {
        Self {
            id,
            short_key,
            long_url,
            created_at: Utc::now(),
            expires_at: None,
            visit_count: 0,
            last_accessed_at: None,
        }
    }

    /// Expire `ttl` from now
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(36_500));
        self.expires_at = Utc::now().checked_add_signed(ttl);
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Logical expiration check against the current time
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| now > t).unwrap_or(false)
    }

    /// Apply one visit: the in-store half of an atomic increment
    pub(crate) fn stamp_visit(&mut self, now: DateTime<Utc>) {
        self.visit_count = self.visit_count.saturating_add(1);
        self.last_accessed_at = Some(now.max(self.created_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(
            1,
            ShortKey::parse("abc").unwrap(),
            LongUrl::parse("https://example.com").unwrap(),
        )
    }

    #[test]
    fn test_new_record_is_unvisited() {
        let r = record();
        assert_eq!(r.visit_count, 0);
        assert!(r.last_accessed_at.is_none());
        assert!(!r.is_expired());
    }

    #[test]
    fn test_expiration() {
        let past = record().with_expires_at(Some(Utc::now() - ChronoDuration::hours(1)));
        assert!(past.is_expired());

        let future = record().with_ttl(Duration::from_secs(3600));
        assert!(!future.is_expired());
    }

    #[test]
    fn test_stamp_visit() {
        let mut r = record();
        r.stamp_visit(Utc::now());
        r.stamp_visit(Utc::now());
        assert_eq!(r.visit_count, 2);
        assert!(r.last_accessed_at.unwrap() >= r.created_at);
    }
}
