//! Domain Model
//!
//! Validated value objects and the persisted link record.

mod record;
mod url;

pub use record::Record;
pub use url::{LongUrl, ShortKey, MAX_SHORT_KEY_LENGTH, MAX_URL_LENGTH};
