//! Time-series statistics data models
//!
//! One [`MemoryStatItem`] is a single sample of aggregate allocation
//! counters, one value per allocation pool and per tag. The device
//! descriptor and the statistics config are persisted as JSON blobs right
//! after the session log header; the items themselves are fixed-size
//! binary records whose width is derived from the config's pool/tag
//! counts.

use crate::domain::TagMask;
use heapscope_common::{stat_item_size, ByteReader, ByteWriter, FormatError};
use serde::{Deserialize, Serialize};

/// Default number of pending stat items that triggers an automatic
/// log flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64;

/// Descriptor of the profiled device, persisted with every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub udid: String,
    #[serde(default)]
    pub platform: String,
}

impl DeviceInfo {
    /// Directory components under the storage root:
    /// `<manufacturer> <model>/<name> {<udid>}`.
    #[must_use]
    pub fn storage_dir_components(&self) -> (String, String) {
        (
            format!("{} {}", self.manufacturer, self.model),
            format!("{} {{{}}}", self.name, self.udid),
        )
    }
}

/// Statistics configuration: the pool/tag name tables and the flush
/// threshold. Fixes the stat item record width for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatConfig {
    pub pool_names: Vec<String>,
    pub tag_names: Vec<String>,
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

impl StatConfig {
    /// Width in bytes of one stat item record under this config.
    #[must_use]
    pub fn stat_item_size(&self) -> u32 {
        stat_item_size(self.pool_names.len(), self.tag_names.len()) as u32
    }
}

/// One counter value inside a stat sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub allocated: u64,
    pub block_count: u32,
}

impl CounterValues {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        Ok(Self { allocated: r.read_u64()?, block_count: r.read_u32()? })
    }

    fn write(self, w: &mut ByteWriter) {
        w.put_u64(self.allocated);
        w.put_u32(self.block_count);
    }
}

/// One time-series sample: timestamp, active-tags bitmask, and the
/// per-pool / per-tag counter sequences in config order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStatItem {
    pub timestamp: u64,
    pub active_tags: TagMask,
    pub pool_counters: Vec<CounterValues>,
    pub tag_counters: Vec<CounterValues>,
}

impl MemoryStatItem {
    /// Decode one record; counter counts come from the session config.
    ///
    /// # Errors
    /// `FormatError::ShortRead` on truncated input.
    pub fn read(
        r: &mut ByteReader<'_>,
        pool_count: usize,
        tag_count: usize,
    ) -> Result<Self, FormatError> {
        let timestamp = r.read_u64()?;
        let active_tags = TagMask(r.read_u32()?);
        let mut pool_counters = Vec::with_capacity(pool_count);
        for _ in 0..pool_count {
            pool_counters.push(CounterValues::read(r)?);
        }
        let mut tag_counters = Vec::with_capacity(tag_count);
        for _ in 0..tag_count {
            tag_counters.push(CounterValues::read(r)?);
        }
        Ok(Self { timestamp, active_tags, pool_counters, tag_counters })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u64(self.timestamp);
        w.put_u32(self.active_tags.0);
        for counter in &self.pool_counters {
            counter.write(w);
        }
        for counter in &self.tag_counters {
            counter.write(w);
        }
    }

    /// Total bytes currently allocated across all pools.
    #[must_use]
    pub fn total_allocated(&self) -> u64 {
        self.pool_counters.iter().map(|c| c.allocated).sum()
    }
}
