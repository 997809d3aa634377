//! URL Value Objects
//!
//! `LongUrl` and `ShortKey` can only be constructed through validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Host, Url};

use crate::error::ShortenerError;

/// Maximum accepted length of a long URL in bytes
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum accepted length of a short key
pub const MAX_SHORT_KEY_LENGTH: usize = 12;

/// Destination URL of a short link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongUrl(String);

impl LongUrl {
    /// Validate an absolute http(s) URL
    pub fn parse(raw: &str) -> Result<Self, ShortenerError> {
        if raw.is_empty() {
            return Err(ShortenerError::InvalidUrl("URL cannot be empty".into()));
        }
        if raw.len() > MAX_URL_LENGTH {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL exceeds maximum length of {}",
                MAX_URL_LENGTH
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ShortenerError::InvalidUrl("URL contains whitespace".into()));
        }

        let parsed = Url::parse(raw)
            .map_err(|e| ShortenerError::InvalidUrl(format!("malformed URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ShortenerError::InvalidUrl("URL must use http or https".into()));
        }

        match parsed.host() {
            Some(Host::Domain(domain)) => check_domain(domain)?,
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {}
            None => return Err(ShortenerError::InvalidUrl("URL has no host".into())),
        }

        Ok(Self(raw.to_string()))
    }

    /// Normalize then validate user input
    pub fn from_user_input(raw: &str) -> Result<Self, ShortenerError> {
        Self::parse(&Self::normalize(raw))
    }

    /// Prefix `https://` when the input carries no http(s) scheme
    pub fn normalize(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encoded form, safe to place in a `Location` header
    pub fn to_ascii(&self) -> String {
        match Url::parse(&self.0) {
            Ok(url) => url.into(),
            Err(_) => self.0.clone(),
        }
    }
}

/// Hostnames are dot-separated labels of `[A-Za-z0-9_-]` after IDNA mapping;
/// a single trailing dot is allowed.
fn check_domain(domain: &str) -> Result<(), ShortenerError> {
    let labels = domain.strip_suffix('.').unwrap_or(domain);
    let valid = !labels.is_empty()
        && labels.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ShortenerError::InvalidUrl(format!("invalid host '{}'", domain)))
    }
}

impl fmt::Display for LongUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short key identifying a link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortKey(String);

impl ShortKey {
    /// Validate a short key: 1-12 chars of `[A-Za-z0-9_-]`
    pub fn parse(raw: &str) -> Result<Self, ShortenerError> {
        if raw.is_empty() {
            return Err(ShortenerError::InvalidKey("short key cannot be empty".into()));
        }
        if raw.len() > MAX_SHORT_KEY_LENGTH {
            return Err(ShortenerError::InvalidKey(format!(
                "short key exceeds {} characters",
                MAX_SHORT_KEY_LENGTH
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShortenerError::InvalidKey(
                "short key may only contain letters, digits, '-' and '_'".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_url_validation() {
        assert!(LongUrl::parse("https://example.com/a?b=c").is_ok());
        assert!(LongUrl::parse("http://localhost:8080/x").is_ok());

        assert!(LongUrl::parse("").is_err());
        assert!(LongUrl::parse("ftp://example.com").is_err());
        assert!(LongUrl::parse("https://").is_err());
        assert!(LongUrl::parse("https://exa mple.com").is_err());

        for bad in [
            "https://foo:bar",
            "https://exa%zzmple.com",
            "https://a<b>.com",
            "http://[::1",
            "https://..",
            "https://a..b.com",
            "mailto:someone@example.com",
        ] {
            assert!(LongUrl::parse(bad).is_err(), "{} should be rejected", bad);
        }

        assert!(LongUrl::parse("http://127.0.0.1:9000/").is_ok());
        assert!(LongUrl::parse("http://[::1]:8080/x").is_ok());
        assert!(LongUrl::parse("https://user@example.com/").is_ok());
        assert!(LongUrl::parse("https://example.com./").is_ok());

        let too_long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(LongUrl::parse(&too_long).is_err());
    }

    #[test]
    fn test_long_url_keeps_input_and_encodes_for_headers() {
        let url = LongUrl::parse("https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com");

        let unicode = LongUrl::parse("https://example.com/caf\u{e9}").unwrap();
        assert_eq!(unicode.to_ascii(), "https://example.com/caf%C3%A9");
    }

    #[test]
    fn test_long_url_normalize() {
        assert_eq!(LongUrl::normalize("example.com"), "https://example.com");
        assert_eq!(LongUrl::normalize("http://example.com"), "http://example.com");
        assert_eq!(
            LongUrl::from_user_input("  example.com/path ").unwrap().as_str(),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_short_key_validation() {
        assert!(ShortKey::parse("abc123").is_ok());
        assert!(ShortKey::parse("my-link_1").is_ok());

        assert!(ShortKey::parse("").is_err());
        assert!(ShortKey::parse("thirteen-char").is_err());
        assert!(ShortKey::parse("bad/key").is_err());
        assert!(ShortKey::parse("spa ce").is_err());
    }
}
