//! Content fingerprinting.
//!
//! A classic multiply-xor accumulator (seed 5381, factor 33) over UTF-16 code
//! units, paired with the length in code units. Fast and order-sensitive, not
//! cryptographic. Equal fingerprints are treated as equal content.

use std::fmt;

const SEED: u32 = 5381;

/// Fingerprint of a markup string.
///
/// Displays as `"<length>:<hash>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash {
    len: usize,
    acc: u32,
}

impl ContentHash {
    /// Length of the hashed input in UTF-16 code units.
    pub const fn len(self) -> usize {
        self.len
    }

    /// Check whether the hashed input was empty.
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// The 32-bit accumulator value.
    pub const fn value(self) -> u32 {
        self.acc
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.len, self.acc)
    }
}

/// Fingerprint `s`.
#[inline]
pub fn hash(s: &str) -> ContentHash {
    let mut acc = SEED;
    let mut len = 0usize;
    for unit in s.encode_utf16() {
        acc = acc.wrapping_mul(33) ^ u32::from(unit);
        len += 1;
    }
    ContentHash { len, acc }
}
