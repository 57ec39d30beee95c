//! Snapshot storage and ingest
//!
//! A snapshot is a point-in-time capture of every live memory block in the
//! profiled process, persisted as one dump file per capture:
//! - [`MemorySnapshot`] - lightweight descriptor with a lazily loaded payload
//! - [`SnapshotIngest`] - reassembles chunked transfers into a new dump file

pub mod ingest;
pub mod store;

pub use ingest::{scan_dump_files, IngestEvent, SnapshotIngest};
pub use store::{MemoryBlock, MemorySnapshot};

/// Extension of persisted snapshot dump files.
pub const DUMP_EXTENSION: &str = "mdump";
