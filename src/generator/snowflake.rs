//! Snowflake ID Generator
//!
//! 64-bit ids: 41 bits of milliseconds since a custom epoch, 10 bits of node
//! id and a 12-bit per-millisecond sequence.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{GeneratorError, IdGenerator};

/// Custom epoch (2010-11-04T01:42:54.657Z)
pub const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: i64 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug)]
struct State {
    last_ms: i64,
    sequence: i64,
}

/// Thread-safe Snowflake generator for one node
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node_id: i64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(node_id: i64) -> Result<Self, GeneratorError> {
        if !(0..=MAX_NODE).contains(&node_id) {
            return Err(GeneratorError::InvalidNode(node_id));
        }
        Ok(Self {
            node_id,
            state: Mutex::new(State {
                last_ms: -1,
                sequence: 0,
            }),
        })
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    fn now_ms() -> Result<i64, GeneratorError> {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| GeneratorError::ClockBeforeEpoch)?;
        Ok(since_unix.as_millis() as i64 - EPOCH_MS)
    }
}

impl IdGenerator for SnowflakeGenerator {
    fn generate(&self) -> Result<i64, GeneratorError> {
        let mut state = self.state.lock();
        let mut now = Self::now_ms()?;

        // never hand out ids from the past if the wall clock steps back
        if now < state.last_ms {
            now = state.last_ms;
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = Self::now_ms()?.max(state.last_ms);
                    if now == state.last_ms {
                        std::thread::yield_now();
                    }
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now;
        Ok((now << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | state.sequence)
    }
}
