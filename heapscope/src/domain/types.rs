//! Core newtypes for the session engine.
//!
//! Raw `u32`/`u64` values cross the file format boundary; wrapping the
//! identity-bearing ones keeps a backtrace hash from being confused with a
//! tag mask in a signature.

use std::fmt;

/// Content hash identifying a deduplicated backtrace.
///
/// Assigned by the producer (FNV-1a over the frame addresses); multiple
/// memory blocks reference the same hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BacktraceHash(pub u32);

impl fmt::Display for BacktraceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bt:0x{:08x}", self.0)
    }
}

/// Index into the session's allocation-pool name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIndex(pub u32);

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool:{}", self.0)
    }
}

/// Bitmask of producer-defined tags active on a block or a stat sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TagMask(pub u32);

impl TagMask {
    /// Whether the tag at `bit` is set.
    #[must_use]
    pub fn has_tag(self, bit: u32) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    /// Number of tags set.
    #[must_use]
    pub fn tag_count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Display for TagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tags:0x{:08x}", self.0)
    }
}
