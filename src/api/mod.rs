//! HTTP API
//!
//! Public shortener endpoints plus the admin cleanup and metrics surface.

mod router;

pub use router::{effective_batch_size, ApiError, ApiRouter, MAX_BODY_SIZE, MAX_MANUAL_BATCH};
