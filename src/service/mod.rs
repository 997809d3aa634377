//! Service Layer
//!
//! Shortener use case, visit counting and the expired-record reaper.

mod dto;
mod reaper;
mod shortener;
mod visit;

pub use dto::{ShortenRequest, ShortenResponse, UrlStats};
pub use reaper::{CleanupStats, Reaper};
pub use shortener::{Shortener, ShortenerSettings};
pub use visit::{DedupPruner, VisitCounter};
