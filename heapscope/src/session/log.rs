//! Append-only binary log of statistics items.
//!
//! Layout: 32-byte [`LogHeader`], JSON device descriptor, JSON stat
//! config, then a flat run of fixed-size stat item records.
//!
//! Appended items sit in an in-memory buffer; full batches of
//! `flush_threshold` items are written automatically, the remainder on an
//! explicit flush (session close or connection loss). Every flush
//! rewrites the header in place with the flushed count and `finished = 1`,
//! so a header left with `finished = 0` marks an abnormal termination and
//! at most the last unflushed batch is lost.

use crate::domain::LogError;
use crate::stats::{DeviceInfo, MemoryStatItem, StatConfig};
use heapscope_common::{ByteReader, ByteWriter, FormatError, LogHeader, LOG_HEADER_SIZE};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writer half of the session log. One instance exclusively owns the
/// file handle for the session's lifetime.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: File,
    config: StatConfig,
    dev_info_size: u32,
    stat_config_size: u32,
    item_size: u32,
    flushed_count: u32,
    pending: Vec<MemoryStatItem>,
}

/// Everything reconstructed from a persisted log file.
#[derive(Debug)]
pub struct LoadedLog {
    pub device: DeviceInfo,
    pub config: StatConfig,
    pub items: Vec<MemoryStatItem>,
    /// `false` means the session crashed before its final flush; the
    /// items up to the last flushed record are still valid.
    pub finished: bool,
}

impl SessionLog {
    /// Create the log file: header with `stat_count = 0, finished = 0`,
    /// then the serialized device descriptor and config.
    ///
    /// # Errors
    /// I/O failures creating or writing the file.
    pub fn create(
        path: impl AsRef<Path>,
        device: &DeviceInfo,
        config: StatConfig,
    ) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let dev_info = serde_json::to_vec(device).map_err(LogError::DeviceDescriptor)?;
        let stat_config = serde_json::to_vec(&config).map_err(LogError::StatConfig)?;
        let item_size = config.stat_item_size();

        let header = LogHeader {
            stat_count: 0,
            finished: false,
            dev_info_size: dev_info.len() as u32,
            stat_config_size: stat_config.len() as u32,
            stat_item_size: item_size,
        };
        let mut w = ByteWriter::with_capacity(LOG_HEADER_SIZE + dev_info.len() + stat_config.len());
        header.write(&mut w);
        w.put_bytes(&dev_info);
        w.put_bytes(&stat_config);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&w.into_bytes())?;
        file.flush()?;

        debug!("created session log {}", path.display());
        Ok(Self {
            path,
            file,
            config,
            dev_info_size: dev_info.len() as u32,
            stat_config_size: stat_config.len() as u32,
            item_size,
            flushed_count: 0,
            pending: Vec::new(),
        })
    }

    /// Buffer items for the next flush. Full batches of
    /// `flush_threshold` items are written out immediately, so at most
    /// `flush_threshold - 1` items are ever pending afterwards.
    ///
    /// # Errors
    /// I/O failures while writing a full batch.
    pub fn append_items(
        &mut self,
        items: impl IntoIterator<Item = MemoryStatItem>,
    ) -> Result<(), LogError> {
        self.pending.extend(items);
        // Guard against a zero threshold from a hand-edited config.
        let threshold = self.config.flush_threshold.max(1);
        while self.pending.len() >= threshold {
            self.flush_batch(threshold)?;
        }
        Ok(())
    }

    /// Write out everything pending and mark the header finished.
    ///
    /// # Errors
    /// I/O failures while writing items or rewriting the header.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.flush_batch(self.pending.len())
    }

    fn flush_batch(&mut self, count: usize) -> Result<(), LogError> {
        let mut w = ByteWriter::with_capacity(count * self.item_size as usize);
        for item in self.pending.drain(..count) {
            item.write(&mut w);
        }

        let items_end = self.items_offset() + u64::from(self.flushed_count) * u64::from(self.item_size);
        self.file.seek(SeekFrom::Start(items_end))?;
        self.file.write_all(&w.into_bytes())?;
        self.flushed_count += count as u32;

        // Rewrite the header in place, then restore the end-of-file
        // position for the next batch.
        let header = LogHeader {
            stat_count: self.flushed_count,
            finished: true,
            dev_info_size: self.dev_info_size,
            stat_config_size: self.stat_config_size,
            stat_item_size: self.item_size,
        };
        let mut hw = ByteWriter::with_capacity(LOG_HEADER_SIZE);
        header.write(&mut hw);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&hw.into_bytes())?;
        self.file.flush()?;
        self.file.seek(SeekFrom::End(0))?;

        debug!("flushed {} stat items ({} total)", count, self.flushed_count);
        Ok(())
    }

    fn items_offset(&self) -> u64 {
        (LOG_HEADER_SIZE as u64) + u64::from(self.dev_info_size) + u64::from(self.stat_config_size)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn flushed_count(&self) -> u32 {
        self.flushed_count
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn config(&self) -> &StatConfig {
        &self.config
    }
}

/// Load a persisted log: validate the header, reconstruct the device
/// descriptor and config, then stream-read all item records.
///
/// A log with `finished = 0` is still loadable up to the last flushed
/// record; it is reported with a warning, not an error.
///
/// # Errors
/// Any short read, signature mismatch, or malformed JSON blob fails the
/// whole load.
pub fn load_log_file(path: impl AsRef<Path>) -> Result<LoadedLog, LogError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut r = ByteReader::new(&bytes);

    let header = LogHeader::read(&mut r)?;
    let device: DeviceInfo = serde_json::from_slice(r.read_bytes(header.dev_info_size as usize)?)
        .map_err(LogError::DeviceDescriptor)?;
    let config: StatConfig = serde_json::from_slice(r.read_bytes(header.stat_config_size as usize)?)
        .map_err(LogError::StatConfig)?;

    let expected = config.stat_item_size();
    if header.stat_item_size != expected {
        return Err(LogError::ItemSizeMismatch { expected, found: header.stat_item_size });
    }

    if !header.finished {
        warn!(
            "session log {} was not finished cleanly; the last unflushed batch is lost",
            path.display()
        );
    }

    // The declared item run must fit in the bytes actually on disk before
    // anything is allocated from the count. Trailing bytes beyond it are
    // tolerated: a crash mid-batch leaves a partial record run after the
    // last flushed header.
    let declared = u64::from(header.stat_count) * u64::from(header.stat_item_size);
    if (r.remaining() as u64) < declared {
        return Err(FormatError::SizeMismatch { declared, actual: r.remaining() as u64 }.into());
    }

    let mut items = Vec::with_capacity(header.stat_count as usize);
    for _ in 0..header.stat_count {
        items.push(MemoryStatItem::read(&mut r, config.pool_names.len(), config.tag_names.len())?);
    }

    Ok(LoadedLog { device, config, items, finished: header.finished })
}
