//! Shared fixtures: in-memory construction of valid snapshot dump files.

// Not every test binary exercises every fixture.
#![allow(dead_code)]

use heapscope_common::{
    fnv1a32, BacktraceRecord, BlockRecord, ByteWriter, DumpHeader, SymbolRecord,
    BLOCK_FLAG_ALLOCATED_BY_APP,
};

/// Everything needed to encode one snapshot dump.
pub struct DumpSpec {
    pub timestamp: u64,
    pub depth: u32,
    pub stat_block_size: u32,
    pub blocks: Vec<BlockRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub backtraces: Vec<BacktraceRecord>,
}

impl DumpSpec {
    pub fn new(depth: u32) -> Self {
        Self {
            timestamp: 1_725_000_000,
            depth,
            stat_block_size: 16,
            blocks: Vec::new(),
            symbols: Vec::new(),
            backtraces: Vec::new(),
        }
    }

    pub fn symbol(&mut self, address: u64, name: &str) -> &mut Self {
        self.symbols.push(SymbolRecord { address, name: name.to_string() });
        self
    }

    /// Register a backtrace over the given frame addresses (innermost
    /// first), zero-padded to the dump's uniform depth. Returns the
    /// producer-style content hash identifying it.
    pub fn backtrace(&mut self, frames: &[u64]) -> u32 {
        assert!(frames.len() <= self.depth as usize);
        let mut bytes = Vec::with_capacity(frames.len() * 8);
        for &f in frames {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        let hash = fnv1a32(&bytes);
        let mut padded = frames.to_vec();
        padded.resize(self.depth as usize, 0);
        self.backtraces.push(BacktraceRecord { hash, frames: padded });
        hash
    }

    pub fn block(&mut self, address: u64, size: u32, backtrace_hash: u32) -> &mut Self {
        self.blocks.push(BlockRecord {
            address,
            size,
            pool_index: 0,
            tag_mask: 0,
            backtrace_hash,
            flags: BLOCK_FLAG_ALLOCATED_BY_APP,
        });
        self
    }

    /// Serialize to the exact on-disk layout, header `total_size` included.
    pub fn encode(&self) -> Vec<u8> {
        let header = DumpHeader {
            total_size: 0, // patched below
            timestamp: self.timestamp,
            block_count: self.blocks.len() as u32,
            symbol_count: self.symbols.len() as u32,
            backtrace_count: self.backtraces.len() as u32,
            backtrace_depth: self.depth,
            stat_block_size: self.stat_block_size,
        };
        let total = header.expected_size();
        let header = DumpHeader { total_size: total as u32, ..header };

        let mut w = ByteWriter::with_capacity(total as usize);
        header.write(&mut w);
        w.put_bytes(&vec![0_u8; self.stat_block_size as usize]);
        for block in &self.blocks {
            block.write(&mut w);
        }
        for symbol in &self.symbols {
            symbol.write(&mut w);
        }
        for backtrace in &self.backtraces {
            backtrace.write(&mut w);
        }
        let bytes = w.into_bytes();
        assert_eq!(bytes.len() as u64, total);
        bytes
    }
}

/// A small three-path dump used by several tests:
///
/// ```text
/// main → run → load_level → malloc   (2 blocks, 100 + 28 bytes)
/// main → run → malloc                (1 block, 64 bytes)
/// idle → tick                        (1 block, 8 bytes; no "main" root)
/// ```
pub fn sample_dump() -> (DumpSpec, SampleHashes) {
    let mut spec = DumpSpec::new(8);
    spec.symbol(0x100, "main")
        .symbol(0x200, "run")
        .symbol(0x300, "load_level")
        .symbol(0x400, "malloc")
        .symbol(0x500, "idle")
        .symbol(0x600, "tick");

    let deep = spec.backtrace(&[0x400, 0x300, 0x200, 0x100]);
    let shallow = spec.backtrace(&[0x400, 0x200, 0x100]);
    let unrooted = spec.backtrace(&[0x600, 0x500]);

    spec.block(0x7000_0000, 100, deep)
        .block(0x7000_1000, 28, deep)
        .block(0x7000_2000, 64, shallow)
        .block(0x7000_3000, 8, unrooted);

    (spec, SampleHashes { deep, shallow, unrooted })
}

/// Backtrace hashes of [`sample_dump`], for targeted assertions.
pub struct SampleHashes {
    pub deep: u32,
    pub shallow: u32,
    pub unrooted: u32,
}
