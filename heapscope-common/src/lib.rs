//! # Shared File/Wire Format (instrumented process ↔ profiler)
//!
//! Defines the binary layouts shared between the in-process memory
//! instrumentation (producer) and the profiler session engine (consumer):
//! the session log file, the snapshot dump file, and the content hash used
//! for symbol-name and backtrace identity.
//!
//! All multi-byte fields are **little-endian**. Every record is read through
//! the bounds-checked [`ByteReader`] rather than by reinterpreting byte
//! buffers, so a truncated or corrupt file surfaces as a [`FormatError`]
//! instead of undefined behavior.
//!
//! ## Key Types
//!
//! - [`LogHeader`] - 32-byte header of the session log file
//! - [`DumpHeader`] - 48-byte header of a snapshot dump file
//! - [`BlockRecord`] - one live memory block in a dump
//! - [`SymbolRecord`] - one address → name mapping in a dump
//! - [`BacktraceRecord`] - one deduplicated call stack in a dump

use thiserror::Error;

// ============================================================================
// Format Constants
// ============================================================================

/// Signature of a session log file ("MPLG").
pub const LOG_SIGNATURE: u32 = u32::from_le_bytes(*b"MPLG");

/// Signature of a snapshot dump file ("MPDM").
pub const DUMP_SIGNATURE: u32 = u32::from_le_bytes(*b"MPDM");

/// Size of the fixed session log header, bytes.
pub const LOG_HEADER_SIZE: usize = 32;

/// Size of the fixed snapshot dump header, bytes.
pub const DUMP_HEADER_SIZE: usize = 48;

/// Size of one block record in a dump, bytes.
pub const BLOCK_RECORD_SIZE: usize = 32;

/// Fixed length of the name field in a symbol record, bytes.
///
/// Longer names are truncated by the producer; shorter names are
/// NUL-padded. An all-NUL name means the producer could not resolve the
/// address and the consumer synthesizes a hex placeholder.
pub const SYMBOL_NAME_LEN: usize = 136;

/// Size of one symbol record in a dump, bytes (address + name field).
pub const SYMBOL_RECORD_SIZE: usize = 8 + SYMBOL_NAME_LEN;

/// Size of one counter value inside a stat item record, bytes.
pub const COUNTER_SIZE: usize = 12;

/// Block record flag: the allocation was requested by application code
/// (as opposed to allocator/runtime bookkeeping).
pub const BLOCK_FLAG_ALLOCATED_BY_APP: u32 = 1;

/// Size of one backtrace record for the given per-dump frame depth.
#[must_use]
pub const fn backtrace_record_size(depth: u32) -> usize {
    4 + 8 * depth as usize
}

/// Size of one stat item record for the given counter counts:
/// timestamp + active-tags bitmask + one counter per pool and per tag.
#[must_use]
pub const fn stat_item_size(pool_count: usize, tag_count: usize) -> usize {
    8 + 4 + COUNTER_SIZE * (pool_count + tag_count)
}

// ============================================================================
// Content Hash
// ============================================================================

/// 32-bit FNV-1a over a byte string.
///
/// This is the format-level identity hash: the producer keys backtraces
/// and symbol names by it, and the consumer deduplicates by the same
/// function. Stability across versions is part of the file contract.
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

// ============================================================================
// Errors
// ============================================================================

/// Structural errors raised while decoding a log or dump file.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("unexpected end of data at offset {offset} (need {need} more bytes)")]
    ShortRead { offset: usize, need: usize },

    #[error("bad file signature 0x{found:08x} (expected 0x{expected:08x})")]
    BadSignature { found: u32, expected: u32 },

    #[error("declared size {declared} does not match actual size {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
}

// ============================================================================
// Bounds-Checked Reader / Writer
// ============================================================================

/// Sequential little-endian reader over an in-memory byte buffer.
///
/// Every read checks the remaining length first; a short read fails with
/// the current offset so load errors point at the corrupt record.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes as a slice.
    ///
    /// # Errors
    /// `FormatError::ShortRead` if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::ShortRead { offset: self.pos, need: n - self.remaining() });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Skip `n` bytes without inspecting them.
    ///
    /// # Errors
    /// `FormatError::ShortRead` if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.read_bytes(n).map(|_| ())
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    /// `FormatError::ShortRead` if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4])))
    }

    /// Read a little-endian `u64`.
    ///
    /// # Errors
    /// `FormatError::ShortRead` if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8])))
    }
}

/// Sequential little-endian writer, the mirror of [`ByteReader`].
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write `bytes` truncated or NUL-padded to exactly `len` bytes.
    pub fn put_fixed_str(&mut self, bytes: &[u8], len: usize) {
        let take = bytes.len().min(len);
        self.buf.extend_from_slice(&bytes[..take]);
        self.buf.resize(self.buf.len() + (len - take), 0);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Session Log Header
// ============================================================================

/// Fixed 32-byte header of the session log file.
///
/// Layout: `signature:u32, stat_count:u32, finished:u32, dev_info_size:u32,
/// stat_config_size:u32, stat_item_size:u32, padding:u32[2]`.
///
/// `finished == 0` on a closed file marks an abnormal termination: the
/// writer rewrites the header with `finished = 1` on every flush, so a
/// crash can only lose the last unflushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub stat_count: u32,
    pub finished: bool,
    pub dev_info_size: u32,
    pub stat_config_size: u32,
    pub stat_item_size: u32,
}

impl LogHeader {
    /// Decode and signature-check the header.
    ///
    /// # Errors
    /// `FormatError` on short read or wrong signature.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let signature = r.read_u32()?;
        if signature != LOG_SIGNATURE {
            return Err(FormatError::BadSignature { found: signature, expected: LOG_SIGNATURE });
        }
        let stat_count = r.read_u32()?;
        let finished = r.read_u32()? != 0;
        let dev_info_size = r.read_u32()?;
        let stat_config_size = r.read_u32()?;
        let stat_item_size = r.read_u32()?;
        r.skip(8)?; // padding
        Ok(Self { stat_count, finished, dev_info_size, stat_config_size, stat_item_size })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(LOG_SIGNATURE);
        w.put_u32(self.stat_count);
        w.put_u32(u32::from(self.finished));
        w.put_u32(self.dev_info_size);
        w.put_u32(self.stat_config_size);
        w.put_u32(self.stat_item_size);
        w.put_u32(0);
        w.put_u32(0);
    }
}

// ============================================================================
// Snapshot Dump Header and Records
// ============================================================================

/// Fixed 48-byte header of a snapshot dump file.
///
/// Layout: `signature:u32, total_size:u32, timestamp:u64, block_count:u32,
/// symbol_count:u32, backtrace_count:u32, backtrace_depth:u32,
/// stat_block_size:u32, padding:u32[3]`.
///
/// `total_size` covers the whole file including this header and must
/// match both the on-disk size and the sum of the declared segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpHeader {
    pub total_size: u32,
    pub timestamp: u64,
    pub block_count: u32,
    pub symbol_count: u32,
    pub backtrace_count: u32,
    pub backtrace_depth: u32,
    pub stat_block_size: u32,
}

impl DumpHeader {
    /// Decode and signature-check the header.
    ///
    /// # Errors
    /// `FormatError` on short read or wrong signature.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let signature = r.read_u32()?;
        if signature != DUMP_SIGNATURE {
            return Err(FormatError::BadSignature { found: signature, expected: DUMP_SIGNATURE });
        }
        let total_size = r.read_u32()?;
        let timestamp = r.read_u64()?;
        let block_count = r.read_u32()?;
        let symbol_count = r.read_u32()?;
        let backtrace_count = r.read_u32()?;
        let backtrace_depth = r.read_u32()?;
        let stat_block_size = r.read_u32()?;
        r.skip(12)?; // padding
        Ok(Self {
            total_size,
            timestamp,
            block_count,
            symbol_count,
            backtrace_count,
            backtrace_depth,
            stat_block_size,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(DUMP_SIGNATURE);
        w.put_u32(self.total_size);
        w.put_u64(self.timestamp);
        w.put_u32(self.block_count);
        w.put_u32(self.symbol_count);
        w.put_u32(self.backtrace_count);
        w.put_u32(self.backtrace_depth);
        w.put_u32(self.stat_block_size);
        w.put_u32(0);
        w.put_u32(0);
        w.put_u32(0);
    }

    /// File size implied by the declared record counts.
    #[must_use]
    pub fn expected_size(&self) -> u64 {
        DUMP_HEADER_SIZE as u64
            + u64::from(self.stat_block_size)
            + u64::from(self.block_count) * BLOCK_RECORD_SIZE as u64
            + u64::from(self.symbol_count) * SYMBOL_RECORD_SIZE as u64
            + u64::from(self.backtrace_count) * backtrace_record_size(self.backtrace_depth) as u64
    }
}

/// One live memory block, 32 bytes.
///
/// Layout: `address:u64, size:u32, pool_index:u32, tag_mask:u32,
/// backtrace_hash:u32, flags:u32, padding:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub address: u64,
    pub size: u32,
    pub pool_index: u32,
    pub tag_mask: u32,
    pub backtrace_hash: u32,
    pub flags: u32,
}

impl BlockRecord {
    /// # Errors
    /// `FormatError::ShortRead` on truncated input.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let address = r.read_u64()?;
        let size = r.read_u32()?;
        let pool_index = r.read_u32()?;
        let tag_mask = r.read_u32()?;
        let backtrace_hash = r.read_u32()?;
        let flags = r.read_u32()?;
        r.skip(4)?; // padding
        Ok(Self { address, size, pool_index, tag_mask, backtrace_hash, flags })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u64(self.address);
        w.put_u32(self.size);
        w.put_u32(self.pool_index);
        w.put_u32(self.tag_mask);
        w.put_u32(self.backtrace_hash);
        w.put_u32(self.flags);
        w.put_u32(0);
    }

    #[must_use]
    pub fn allocated_by_app(&self) -> bool {
        self.flags & BLOCK_FLAG_ALLOCATED_BY_APP != 0
    }
}

/// One address → name mapping, 144 bytes (`address:u64, name:[u8;136]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub address: u64,
    /// Resolved name, empty if the producer had none for this address.
    pub name: String,
}

impl SymbolRecord {
    /// # Errors
    /// `FormatError::ShortRead` on truncated input.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let address = r.read_u64()?;
        let raw = r.read_bytes(SYMBOL_NAME_LEN)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(SYMBOL_NAME_LEN);
        let name = String::from_utf8_lossy(&raw[..end]).into_owned();
        Ok(Self { address, name })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u64(self.address);
        w.put_fixed_str(self.name.as_bytes(), SYMBOL_NAME_LEN);
    }
}

/// One deduplicated call stack: `hash:u32, frames:u64[depth]`.
///
/// Frame addresses are ordered innermost-first (allocation site at
/// index 0). `depth` is uniform per dump and comes from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceRecord {
    pub hash: u32,
    pub frames: Vec<u64>,
}

impl BacktraceRecord {
    /// # Errors
    /// `FormatError::ShortRead` on truncated input.
    pub fn read(r: &mut ByteReader<'_>, depth: u32) -> Result<Self, FormatError> {
        let hash = r.read_u32()?;
        let mut frames = Vec::with_capacity(depth as usize);
        for _ in 0..depth {
            frames.push(r.read_u64()?);
        }
        Ok(Self { hash, frames })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.hash);
        for &frame in &self.frames {
            w.put_u64(frame);
        }
    }
}
