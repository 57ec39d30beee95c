//! In-memory symbol and backtrace index.
//!
//! Deduplicates symbol names by a content hash of their bytes and
//! backtraces by the producer-assigned hash. Purely additive, no I/O.
//! A lookup collision is confirmed with a string comparison rather than
//! trusted blindly; a mismatch surfaces as [`SymbolError`] so corrupt
//! input fails the load instead of silently aliasing two names.

use crate::domain::{BacktraceHash, SymbolError};
use heapscope_common::fnv1a32;
use std::collections::HashMap;

/// Name synthesized for an address whose dump record carried no symbol.
///
/// Purely consumer-side: a later dump that does carry the real name for
/// the address replaces the placeholder instead of tripping
/// [`SymbolError::SymbolRedefined`].
#[must_use]
pub fn placeholder_name(address: u64) -> String {
    format!("{address:016x}")
}

/// Per-session symbol/backtrace index.
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Name-hash → name (deduplicated storage).
    names: HashMap<u32, String>,
    /// Address → name-hash.
    addresses: HashMap<u64, u32>,
    /// Backtrace hash → ordered frame names, innermost first.
    backtraces: HashMap<BacktraceHash, Vec<String>>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for `address`. Idempotent.
    ///
    /// Placeholder names (see [`placeholder_name`]) are second-class: a
    /// real name upgrades an address currently mapped to its placeholder,
    /// and a placeholder never displaces a real name already registered by
    /// another dump.
    ///
    /// # Errors
    /// - `SymbolError::SymbolRedefined` if the address is already mapped
    ///   to a different real name.
    /// - `SymbolError::NameHashCollision` if two different names hash to
    ///   the same value (this would corrupt the dedup table).
    pub fn add_symbol(&mut self, address: u64, name: &str) -> Result<(), SymbolError> {
        let hash = fnv1a32(name.as_bytes());

        if let Some(existing) = self.names.get(&hash) {
            if existing != name {
                return Err(SymbolError::NameHashCollision {
                    hash,
                    existing: existing.clone(),
                    incoming: name.to_string(),
                });
            }
        } else {
            self.names.insert(hash, name.to_string());
        }

        if let Some(&known) = self.addresses.get(&address) {
            if known != hash {
                let existing = self.names.get(&known).cloned().unwrap_or_default();
                if existing == placeholder_name(address) {
                    self.addresses.insert(address, hash);
                    return Ok(());
                }
                if name == placeholder_name(address) {
                    return Ok(());
                }
                return Err(SymbolError::SymbolRedefined {
                    address,
                    existing,
                    incoming: name.to_string(),
                });
            }
            return Ok(());
        }
        self.addresses.insert(address, hash);
        Ok(())
    }

    /// Register the frame names of a backtrace the first time its hash is
    /// seen. Idempotent; a later registration with the same hash must
    /// reproduce an identical frame list.
    ///
    /// # Errors
    /// `SymbolError::BacktraceRedefined` if the hash is already bound to a
    /// different frame list.
    pub fn add_backtrace(
        &mut self,
        hash: BacktraceHash,
        frames: Vec<String>,
    ) -> Result<(), SymbolError> {
        if let Some(existing) = self.backtraces.get(&hash) {
            if *existing != frames {
                return Err(SymbolError::BacktraceRedefined { hash: hash.0 });
            }
            return Ok(());
        }
        self.backtraces.insert(hash, frames);
        Ok(())
    }

    /// Resolved name for an address, empty string if unknown.
    #[must_use]
    pub fn symbol(&self, address: u64) -> &str {
        self.addresses
            .get(&address)
            .and_then(|hash| self.names.get(hash))
            .map_or("", String::as_str)
    }

    /// Frame names for a backtrace hash, empty slice if unknown.
    #[must_use]
    pub fn frames(&self, hash: BacktraceHash) -> &[String] {
        self.backtraces.get(&hash).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct addresses registered.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.addresses.len()
    }

    /// Number of distinct backtraces registered.
    #[must_use]
    pub fn backtrace_count(&self) -> usize {
        self.backtraces.len()
    }
}
