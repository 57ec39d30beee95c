//! Snapshot dump parsing and the lazily loaded block payload.
//!
//! A [`MemorySnapshot`] starts as a lightweight descriptor read from the
//! dump header; `load` parses the full file into block records and
//! registers every symbol and backtrace with the session's
//! [`SymbolTable`]. Loading is all-or-nothing: any short read, size
//! mismatch, or count mismatch leaves the snapshot unloaded with no
//! partial state.

use crate::domain::{BacktraceHash, PoolIndex, SnapshotError, TagMask};
use crate::symbols::{placeholder_name, SymbolTable};
use heapscope_common::{BacktraceRecord, BlockRecord, ByteReader, DumpHeader, SymbolRecord};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One live allocation from a snapshot. Read-only after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub address: u64,
    pub size: u32,
    pub pool_index: PoolIndex,
    pub tag_mask: TagMask,
    pub backtrace_hash: BacktraceHash,
    pub allocated_by_app: bool,
}

impl MemoryBlock {
    fn from_record(record: &BlockRecord) -> Self {
        Self {
            address: record.address,
            size: record.size,
            pool_index: PoolIndex(record.pool_index),
            tag_mask: TagMask(record.tag_mask),
            backtrace_hash: BacktraceHash(record.backtrace_hash),
            allocated_by_app: record.allocated_by_app(),
        }
    }
}

/// Persisted snapshot: descriptor plus lazily loaded payload.
///
/// Unloaded by default to bound memory; callers must not hold references
/// into `blocks` across an [`unload`](Self::unload).
#[derive(Debug)]
pub struct MemorySnapshot {
    path: PathBuf,
    timestamp: u64,
    block_count: u32,
    symbol_count: u32,
    backtrace_count: u32,
    backtrace_depth: u32,
    total_size: u32,
    loaded: bool,
    blocks: Vec<MemoryBlock>,
    /// Backtrace hash → blocks sharing it. BTreeMap so branch building
    /// iterates groups in a deterministic order.
    block_map: BTreeMap<BacktraceHash, Vec<MemoryBlock>>,
}

impl MemorySnapshot {
    /// Create a descriptor by reading only the dump header.
    ///
    /// Validates the signature and that the on-disk size matches the
    /// header's declared size, so a registered descriptor is known to be
    /// structurally plausible before anyone pays for a full load.
    ///
    /// # Errors
    /// `SnapshotError` on I/O failure, bad signature, or size mismatch.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref().to_path_buf();
        let bytes = {
            let mut header = vec![0_u8; heapscope_common::DUMP_HEADER_SIZE];
            use std::io::Read;
            let mut file = fs::File::open(&path)?;
            file.read_exact(&mut header)?;
            header
        };
        let header = DumpHeader::read(&mut ByteReader::new(&bytes))?;

        let actual = fs::metadata(&path)?.len();
        if actual != u64::from(header.total_size) {
            return Err(SnapshotError::FileSizeMismatch {
                declared: u64::from(header.total_size),
                actual,
            });
        }
        if header.expected_size() != u64::from(header.total_size) {
            return Err(SnapshotError::SegmentSumMismatch {
                declared: u64::from(header.total_size),
                segments: header.expected_size(),
            });
        }

        Ok(Self {
            path,
            timestamp: header.timestamp,
            block_count: header.block_count,
            symbol_count: header.symbol_count,
            backtrace_count: header.backtrace_count,
            backtrace_depth: header.backtrace_depth,
            total_size: header.total_size,
            loaded: false,
            blocks: Vec::new(),
            block_map: BTreeMap::new(),
        })
    }

    /// Parse the full dump and register its symbols and backtraces.
    ///
    /// Symbol records without a human-readable name are registered under a
    /// zero-padded hex placeholder; a later dump carrying the real name
    /// for the same address replaces it. Raw blocks are kept
    /// unresolved; name resolution happens only when the branch builder
    /// consumes the block map.
    ///
    /// # Errors
    /// Any failure leaves `loaded == false` and the block vector empty.
    pub fn load(&mut self, symbols: &mut SymbolTable) -> Result<(), SnapshotError> {
        if self.loaded {
            return Ok(());
        }

        let bytes = fs::read(&self.path)?;
        if bytes.len() as u64 != u64::from(self.total_size) {
            return Err(SnapshotError::FileSizeMismatch {
                declared: u64::from(self.total_size),
                actual: bytes.len() as u64,
            });
        }

        let mut r = ByteReader::new(&bytes);
        let header = DumpHeader::read(&mut r)?;

        // The file may have changed since the descriptor was created, so
        // the re-read header is untrusted: its counts must add up to the
        // bytes actually present before any count-sized allocation.
        if u64::from(header.total_size) != bytes.len() as u64 {
            return Err(SnapshotError::FileSizeMismatch {
                declared: u64::from(header.total_size),
                actual: bytes.len() as u64,
            });
        }
        if header.expected_size() != bytes.len() as u64 {
            return Err(SnapshotError::SegmentSumMismatch {
                declared: bytes.len() as u64,
                segments: header.expected_size(),
            });
        }

        // The embedded statistics segment exists for producer-side
        // validation only; skip it.
        r.skip(header.stat_block_size as usize)?;

        let mut blocks = Vec::with_capacity(header.block_count as usize);
        for _ in 0..header.block_count {
            blocks.push(MemoryBlock::from_record(&BlockRecord::read(&mut r)?));
        }

        for _ in 0..header.symbol_count {
            let record = SymbolRecord::read(&mut r)?;
            if record.name.is_empty() {
                symbols.add_symbol(record.address, &placeholder_name(record.address))?;
            } else {
                symbols.add_symbol(record.address, &record.name)?;
            }
        }

        for _ in 0..header.backtrace_count {
            let record = BacktraceRecord::read(&mut r, header.backtrace_depth)?;
            let frames = record
                .frames
                .iter()
                .take_while(|&&addr| addr != 0)
                .map(|&addr| {
                    let name = symbols.symbol(addr);
                    if name.is_empty() {
                        placeholder_name(addr)
                    } else {
                        name.to_string()
                    }
                })
                .collect();
            symbols.add_backtrace(BacktraceHash(record.hash), frames)?;
        }

        if r.remaining() != 0 {
            return Err(SnapshotError::TrailingData(r.remaining()));
        }

        debug!(
            "loaded snapshot {}: {} blocks, {} symbols, {} backtraces",
            self.path.display(),
            header.block_count,
            header.symbol_count,
            header.backtrace_count
        );

        self.blocks = blocks;
        self.loaded = true;
        Ok(())
    }

    /// Group the loaded blocks by backtrace hash. O(n) over blocks.
    pub fn build_block_map(&mut self) {
        self.block_map.clear();
        for block in &self.blocks {
            self.block_map.entry(block.backtrace_hash).or_default().push(block.clone());
        }
    }

    /// Drop the payload, keeping the descriptor so the session can
    /// re-load on demand.
    pub fn unload(&mut self) {
        if self.loaded {
            info!("unloading snapshot {}", self.path.display());
        }
        self.blocks.clear();
        self.block_map.clear();
        self.loaded = false;
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    #[must_use]
    pub fn symbol_count(&self) -> u32 {
        self.symbol_count
    }

    #[must_use]
    pub fn backtrace_count(&self) -> u32 {
        self.backtrace_count
    }

    #[must_use]
    pub fn backtrace_depth(&self) -> u32 {
        self.backtrace_depth
    }

    #[must_use]
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn block_map(&self) -> &BTreeMap<BacktraceHash, Vec<MemoryBlock>> {
        &self.block_map
    }
}

