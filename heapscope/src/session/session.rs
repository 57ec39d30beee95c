//! Profiling session orchestration.
//!
//! One [`ProfilingSession`] per profiling run, created either fresh (live
//! capture driven by transport callbacks) or restored from a storage
//! directory (file mode). It owns the symbol table, the session log, the
//! ordered stat items and snapshot descriptors, and the ingest state
//! machine.
//!
//! All mutating operations run on one logical owner thread driven by the
//! transport callbacks; the session is not internally synchronized.

use crate::analysis::{build_branch, BranchTree};
use crate::domain::SessionError;
use crate::session::{load_log_file, SessionLog, LOG_FILE_NAME};
use crate::snapshot::{scan_dump_files, IngestEvent, MemorySnapshot, SnapshotIngest};
use crate::stats::{DeviceInfo, MemoryStatItem, StatConfig};
use crate::symbols::SymbolTable;
use chrono::Local;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Orchestrator for one profiling run.
#[derive(Debug)]
pub struct ProfilingSession {
    device: DeviceInfo,
    config: StatConfig,
    symbols: SymbolTable,
    storage_root: PathBuf,
    storage_dir: Option<PathBuf>,
    log: Option<SessionLog>,
    ingest: Option<SnapshotIngest>,
    stat_items: Vec<MemoryStatItem>,
    snapshots: Vec<MemorySnapshot>,
}

impl ProfilingSession {
    /// Prepare a live-capture session. Nothing touches the filesystem
    /// until the transport reports an established connection.
    #[must_use]
    pub fn new(device: DeviceInfo, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            device,
            config: StatConfig {
                pool_names: Vec::new(),
                tag_names: Vec::new(),
                flush_threshold: crate::stats::DEFAULT_FLUSH_THRESHOLD,
            },
            symbols: SymbolTable::new(),
            storage_root: storage_root.into(),
            storage_dir: None,
            log: None,
            ingest: None,
            stat_items: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Create and immediately start a session: directory layout plus a
    /// fresh log file, as if the transport had just connected.
    ///
    /// # Errors
    /// Directory or log file creation failures.
    pub fn start_new(
        device: DeviceInfo,
        config: StatConfig,
        storage_root: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(device, storage_root);
        session.on_connection_established(false, config)?;
        Ok(session)
    }

    /// Restore a session from its storage directory: log file plus every
    /// recognizable snapshot dump found next to it.
    ///
    /// A dump that fails descriptor validation is skipped with a warning
    /// rather than failing the whole restore.
    ///
    /// # Errors
    /// Missing or malformed log file.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = dir.as_ref();
        let log_path = dir.join(LOG_FILE_NAME);
        if !log_path.is_file() {
            return Err(SessionError::MissingLog { dir: dir.to_path_buf() });
        }
        let loaded = load_log_file(&log_path)?;

        let mut snapshots = Vec::new();
        for path in scan_dump_files(dir)? {
            match MemorySnapshot::from_file(&path) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => warn!("skipping snapshot {}: {err}", path.display()),
            }
        }
        info!(
            "restored session from {}: {} stat items, {} snapshots",
            dir.display(),
            loaded.items.len(),
            snapshots.len()
        );

        Ok(Self {
            device: loaded.device,
            config: loaded.config,
            symbols: SymbolTable::new(),
            storage_root: dir.to_path_buf(),
            storage_dir: Some(dir.to_path_buf()),
            log: None,
            ingest: None,
            stat_items: loaded.items,
            snapshots,
        })
    }

    // ------------------------------------------------------------------
    // Transport callbacks
    // ------------------------------------------------------------------

    /// `resumed = false` starts a brand-new session: creates the storage
    /// directory layout and a fresh log file. `resumed = true` is a
    /// reconnection to the session already in progress and is a no-op.
    ///
    /// # Errors
    /// Directory or log file creation failures.
    pub fn on_connection_established(
        &mut self,
        resumed: bool,
        config: StatConfig,
    ) -> Result<(), SessionError> {
        if resumed {
            info!("reconnected to existing session");
            return Ok(());
        }

        let (vendor, named) = self.device.storage_dir_components();
        let stamp = Local::now().format("%Y-%m-%d %H%M%S").to_string();
        let dir = self.storage_root.join(vendor).join(named).join(stamp);
        fs::create_dir_all(&dir)?;

        let log = SessionLog::create(dir.join(LOG_FILE_NAME), &self.device, config.clone())?;
        info!("started new session in {}", dir.display());

        self.config = config;
        self.log = Some(log);
        self.ingest = Some(SnapshotIngest::new(dir.clone(), 1));
        self.storage_dir = Some(dir);
        self.stat_items.clear();
        self.snapshots.clear();
        Ok(())
    }

    /// Flush the log so the file on disk is consistent up to the last
    /// received item.
    ///
    /// # Errors
    /// Log flush failures.
    pub fn on_connection_lost(&mut self, message: Option<&str>) -> Result<(), SessionError> {
        if let Some(message) = message {
            warn!("connection lost: {message}");
        }
        self.flush()
    }

    /// Append a batch of stat items in arrival order.
    ///
    /// # Errors
    /// Log write failures (a full batch may flush).
    pub fn on_stat_received(&mut self, items: Vec<MemoryStatItem>) -> Result<(), SessionError> {
        if let Some(log) = self.log.as_mut() {
            log.append_items(items.iter().cloned())?;
        }
        self.stat_items.extend(items);
        Ok(())
    }

    /// Drive the snapshot ingest state machine with one transport chunk;
    /// `chunk = None` is the transport's failure signal.
    ///
    /// # Errors
    /// `SessionError::NotStarted` before the first connection, or any
    /// ingest error (the transfer is reset in that case).
    pub fn on_snapshot_chunk(
        &mut self,
        total_size: u64,
        offset: u64,
        chunk: Option<&[u8]>,
    ) -> Result<(), SessionError> {
        let Some(ingest) = self.ingest.as_mut() else {
            return Err(SessionError::NotStarted);
        };
        match ingest.receive_chunk(total_size, offset, chunk)? {
            IngestEvent::Completed(snapshot) => {
                info!(
                    "registered snapshot {} ({} blocks)",
                    snapshot.path().display(),
                    snapshot.block_count()
                );
                self.snapshots.push(snapshot);
            }
            IngestEvent::Progress { .. } | IngestEvent::Aborted => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries and reporting
    // ------------------------------------------------------------------

    /// Write pending stat items and mark the log finished.
    ///
    /// # Errors
    /// Log flush failures.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    #[must_use]
    pub fn pool_names(&self) -> &[String] {
        &self.config.pool_names
    }

    #[must_use]
    pub fn tag_names(&self) -> &[String] {
        &self.config.tag_names
    }

    #[must_use]
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    #[must_use]
    pub fn stat_item_count(&self) -> usize {
        self.stat_items.len()
    }

    #[must_use]
    pub fn stat_item(&self, index: usize) -> Option<&MemoryStatItem> {
        self.stat_items.get(index)
    }

    #[must_use]
    pub fn stat_items(&self) -> &[MemoryStatItem] {
        &self.stat_items
    }

    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn snapshot(&self, index: usize) -> Option<&MemorySnapshot> {
        self.snapshots.get(index)
    }

    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Lazily load a snapshot's payload (blocks + block map). Repeated
    /// calls on a loaded snapshot are cheap no-ops.
    ///
    /// # Errors
    /// Out-of-range index, or an all-or-nothing load failure (the
    /// snapshot stays unloaded).
    pub fn load_snapshot(&mut self, index: usize) -> Result<&MemorySnapshot, SessionError> {
        let count = self.snapshots.len();
        let snapshot = self
            .snapshots
            .get_mut(index)
            .ok_or(SessionError::SnapshotIndex { index, count })?;
        if !snapshot.is_loaded() {
            snapshot.load(&mut self.symbols)?;
            snapshot.build_block_map();
        }
        Ok(&self.snapshots[index])
    }

    /// Release a snapshot's payload, keeping the descriptor.
    ///
    /// # Errors
    /// Out-of-range index.
    pub fn unload_snapshot(&mut self, index: usize) -> Result<(), SessionError> {
        let count = self.snapshots.len();
        let snapshot = self
            .snapshots
            .get_mut(index)
            .ok_or(SessionError::SnapshotIndex { index, count })?;
        snapshot.unload();
        Ok(())
    }

    /// Build the call-tree aggregation for one snapshot, loading it first
    /// if needed.
    ///
    /// # Errors
    /// Out-of-range index or snapshot load failure.
    pub fn build_branch(
        &mut self,
        index: usize,
        root_names: &[String],
    ) -> Result<BranchTree, SessionError> {
        self.load_snapshot(index)?;
        Ok(build_branch(&self.snapshots[index], &self.symbols, root_names))
    }
}
