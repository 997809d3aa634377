//! Base62 Short Keys
//!
//! Encodes non-negative ids with the alphabet `0-9A-Za-z`.

use super::{GeneratorError, ShortKeyGenerator};
use crate::model::ShortKey;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Base62 codec for short keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Base62Encoder;

impl Base62Encoder {
    pub fn new() -> Self {
        Self
    }

    fn index_of(c: u8) -> Option<i64> {
        match c {
            b'0'..=b'9' => Some((c - b'0') as i64),
            b'A'..=b'Z' => Some((c - b'A') as i64 + 10),
            b'a'..=b'z' => Some((c - b'a') as i64 + 36),
            _ => None,
        }
    }
}

impl ShortKeyGenerator for Base62Encoder {
    fn encode(&self, id: i64) -> Result<ShortKey, GeneratorError> {
        if id < 0 {
            return Err(GeneratorError::NegativeId(id));
        }

        let mut num = id as u64;
        let mut buf = Vec::with_capacity(11);
        loop {
            buf.push(ALPHABET[(num % 62) as usize]);
            num /= 62;
            if num == 0 {
                break;
            }
        }
        buf.reverse();

        let encoded = String::from_utf8(buf).map_err(|e| GeneratorError::Encoding(e.to_string()))?;
        ShortKey::parse(&encoded).map_err(|e| GeneratorError::Encoding(e.to_string()))
    }

    fn decode(&self, key: &ShortKey) -> Result<i64, GeneratorError> {
        key.as_str().bytes().try_fold(0i64, |acc, c| {
            let digit = Self::index_of(c)
                .ok_or_else(|| GeneratorError::Encoding(format!("'{}' is not a base62 digit", c as char)))?;
            acc.checked_mul(62)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| GeneratorError::Encoding("key overflows i64".into()))
        })
    }
}
