//! Key Generation
//!
//! Snowflake ids encoded as Base62 short keys.

mod base62;
mod snowflake;

pub use base62::Base62Encoder;
pub use snowflake::{SnowflakeGenerator, EPOCH_MS};

use std::sync::Arc;
use thiserror::Error;

use crate::model::ShortKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("node id {0} out of range 0..=1023")]
    InvalidNode(i64),
    #[error("system clock is before the unix epoch")]
    ClockBeforeEpoch,
    #[error("cannot encode negative id {0}")]
    NegativeId(i64),
    #[error("short key encoding failed: {0}")]
    Encoding(String),
}

/// Source of unique numeric ids
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<i64, GeneratorError>;
}

/// Reversible id <-> short key mapping
pub trait ShortKeyGenerator: Send + Sync {
    fn encode(&self, id: i64) -> Result<ShortKey, GeneratorError>;
    fn decode(&self, key: &ShortKey) -> Result<i64, GeneratorError>;
}

/// Combines an id source with a key encoding
#[derive(Clone)]
pub struct GeneratorService {
    ids: Arc<dyn IdGenerator>,
    keys: Arc<dyn ShortKeyGenerator>,
}

impl GeneratorService {
    pub fn new(ids: Arc<dyn IdGenerator>, keys: Arc<dyn ShortKeyGenerator>) -> Self {
        Self { ids, keys }
    }

    /// Snowflake + Base62 for the given node
    pub fn snowflake(node_id: i64) -> Result<Self, GeneratorError> {
        Ok(Self::new(
            Arc::new(SnowflakeGenerator::new(node_id)?),
            Arc::new(Base62Encoder::new()),
        ))
    }

    /// Fresh id and the short key derived from it
    pub fn generate_short_key(&self) -> Result<(ShortKey, i64), GeneratorError> {
        let id = self.ids.generate()?;
        let key = self.keys.encode(id)?;
        Ok((key, id))
    }

    /// Fresh id for a record whose key was supplied by the caller
    pub fn generate_id(&self) -> Result<i64, GeneratorError> {
        self.ids.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_short_key() {
        let service = GeneratorService::snowflake(3).unwrap();
        let (key, id) = service.generate_short_key().unwrap();
        assert_eq!(Base62Encoder::new().decode(&key).unwrap(), id);
        assert!(key.as_str().len() <= crate::model::MAX_SHORT_KEY_LENGTH);

        let (next, next_id) = service.generate_short_key().unwrap();
        assert_ne!(key, next);
        assert!(next_id > id);
    }
}
