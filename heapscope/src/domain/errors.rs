//! Structured error types for heapscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! Producer inconsistencies (symbol/backtrace redefinition, hash
//! collisions) are real errors here rather than debug assertions, so a
//! corrupt dump degrades into a failed load instead of a crash.

use heapscope_common::FormatError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("symbol at 0x{address:016x} redefined: \"{existing}\" vs \"{incoming}\"")]
    SymbolRedefined { address: u64, existing: String, incoming: String },

    #[error("symbol name hash collision 0x{hash:08x}: \"{existing}\" vs \"{incoming}\"")]
    NameHashCollision { hash: u32, existing: String, incoming: String },

    #[error("backtrace 0x{hash:08x} redefined with different frames")]
    BacktraceRedefined { hash: u32 },
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot file size {actual} does not match declared size {declared}")]
    FileSizeMismatch { declared: u64, actual: u64 },

    #[error("declared segment sizes sum to {segments} but the total size is {declared}")]
    SegmentSumMismatch { declared: u64, segments: u64 },

    #[error("{0} trailing bytes after the last backtrace record")]
    TrailingData(usize),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("stat item size {found} does not match the config-derived size {expected}")]
    ItemSizeMismatch { expected: u32, found: u32 },

    #[error("malformed device descriptor: {0}")]
    DeviceDescriptor(serde_json::Error),

    #[error("malformed statistics config: {0}")]
    StatConfig(serde_json::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("chunk at offset {offset} does not continue the transfer (received {received})")]
    OutOfOrderChunk { offset: u64, received: u64 },

    #[error("chunk overruns the declared total ({received} received + {chunk} > {total})")]
    Overrun { received: u64, chunk: u64, total: u64 },

    #[error("completed transfer is not a valid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no session log found in {}", dir.display())]
    MissingLog { dir: PathBuf },

    #[error("session is not started (no connection established yet)")]
    NotStarted,

    #[error("snapshot index {index} out of range ({count} snapshots)")]
    SnapshotIndex { index: usize, count: usize },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
