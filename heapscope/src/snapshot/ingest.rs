//! Chunked snapshot transfer reassembly.
//!
//! The transport delivers a snapshot as strictly sequential chunks; this
//! state machine appends them to a temp file in the session's storage
//! directory and, once `received == total`, persists the file under the
//! next `snapshot_NNN.mdump` sequence name and turns it into a registered
//! [`MemorySnapshot`] descriptor.
//!
//! A `None` chunk is the transport's failure signal: the partial temp
//! file is deleted and the state machine resets. There is no retry and
//! no timeout; a lost connection mid-transfer is the caller's problem.

use crate::domain::IngestError;
use crate::snapshot::{MemorySnapshot, DUMP_EXTENSION};
use log::{info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Outcome of feeding one chunk to the ingest state machine.
#[derive(Debug)]
pub enum IngestEvent {
    /// Transfer still in flight.
    Progress { received: u64, total: u64 },
    /// Transfer finished; the dump is persisted and described.
    Completed(MemorySnapshot),
    /// Transport signaled failure; partial state discarded.
    Aborted,
}

#[derive(Debug)]
struct Transfer {
    file: NamedTempFile,
    total: u64,
    received: u64,
}

/// Per-session snapshot transfer reassembler.
///
/// `Idle → Receiving → Idle` (completion or abort). At most one transfer
/// is in flight per session.
#[derive(Debug)]
pub struct SnapshotIngest {
    storage_dir: PathBuf,
    active: Option<Transfer>,
    next_seq: u32,
}

impl SnapshotIngest {
    /// `next_seq` numbers new dump files; pass the count of snapshots
    /// already in the directory when resuming an existing session.
    #[must_use]
    pub fn new(storage_dir: PathBuf, next_seq: u32) -> Self {
        Self { storage_dir, active: None, next_seq }
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.active.is_some()
    }

    /// Feed one transport chunk.
    ///
    /// The first chunk of a transfer (no transfer in progress) opens a
    /// fresh temp file; `offset` must equal the bytes received so far.
    ///
    /// # Errors
    /// Out-of-order or oversized chunks abort the transfer and return an
    /// error; the temp file is deleted either way.
    pub fn receive_chunk(
        &mut self,
        total_size: u64,
        offset: u64,
        chunk: Option<&[u8]>,
    ) -> Result<IngestEvent, IngestError> {
        let Some(chunk) = chunk else {
            // Dropping the NamedTempFile removes it from disk.
            if self.active.take().is_some() {
                warn!("snapshot transfer aborted by transport, partial data discarded");
            }
            return Ok(IngestEvent::Aborted);
        };

        if self.active.is_none() {
            let file = NamedTempFile::new_in(&self.storage_dir)?;
            self.active = Some(Transfer { file, total: total_size, received: 0 });
            info!("snapshot transfer started, {total_size} bytes expected");
        }

        // Validation happens with the transfer held so any failure path
        // drops (and deletes) the temp file.
        let (received, total) = match self.append_chunk(offset, chunk) {
            Ok(progress) => progress,
            Err(err) => {
                self.active = None;
                return Err(err);
            }
        };
        if received < total {
            return Ok(IngestEvent::Progress { received, total });
        }

        // Complete: persist under the next sequence-numbered dump name.
        let Some(transfer) = self.active.take() else {
            return Err(IngestError::Io(std::io::Error::other("ingest state lost mid-transfer")));
        };
        let dest = self.next_dump_path();
        transfer.file.persist(&dest).map_err(|e| IngestError::Io(e.error))?;

        match MemorySnapshot::from_file(&dest) {
            Ok(snapshot) => {
                self.next_seq += 1;
                info!("snapshot transfer complete: {}", dest.display());
                Ok(IngestEvent::Completed(snapshot))
            }
            Err(err) => {
                // Do not register garbage; remove the persisted file.
                let _ = fs::remove_file(&dest);
                Err(IngestError::InvalidSnapshot(err))
            }
        }
    }

    fn append_chunk(&mut self, offset: u64, chunk: &[u8]) -> Result<(u64, u64), IngestError> {
        let Some(transfer) = self.active.as_mut() else {
            return Err(IngestError::Io(std::io::Error::other("no transfer in progress")));
        };
        if offset != transfer.received {
            return Err(IngestError::OutOfOrderChunk { offset, received: transfer.received });
        }
        let incoming = chunk.len() as u64;
        if transfer.received + incoming > transfer.total {
            return Err(IngestError::Overrun {
                received: transfer.received,
                chunk: incoming,
                total: transfer.total,
            });
        }
        transfer.file.write_all(chunk)?;
        transfer.received += incoming;
        Ok((transfer.received, transfer.total))
    }

    fn next_dump_path(&self) -> PathBuf {
        self.storage_dir.join(format!("snapshot_{:03}.{}", self.next_seq, DUMP_EXTENSION))
    }
}

/// Scan a session directory for persisted dump files, sorted by name so
/// sequence numbers reload in capture order.
///
/// # Errors
/// Propagates directory read failures.
pub fn scan_dump_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == DUMP_EXTENSION))
        .collect();
    paths.sort();
    Ok(paths)
}
