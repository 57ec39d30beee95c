//! Snapshot dump loading: descriptor validation, all-or-nothing parsing,
//! block map grouping, unload/reload.

mod common;

use common::sample_dump;
use heapscope::domain::{BacktraceHash, SnapshotError};
use heapscope::snapshot::MemorySnapshot;
use heapscope::symbols::SymbolTable;
use tempfile::tempdir;

#[test]
fn test_descriptor_from_valid_dump() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    std::fs::write(&path, spec.encode()).unwrap();

    let snapshot = MemorySnapshot::from_file(&path).unwrap();
    assert_eq!(snapshot.block_count(), 4);
    assert_eq!(snapshot.symbol_count(), 6);
    assert_eq!(snapshot.backtrace_count(), 3);
    assert_eq!(snapshot.backtrace_depth(), 8);
    assert_eq!(snapshot.timestamp(), 1_725_000_000);
    assert!(!snapshot.is_loaded());
    assert!(snapshot.blocks().is_empty());
}

#[test]
fn test_load_registers_symbols_and_backtraces() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, hashes) = sample_dump();
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();

    assert!(snapshot.is_loaded());
    assert_eq!(snapshot.blocks().len(), 4);
    assert_eq!(symbols.symbol(0x100), "main");
    assert_eq!(symbols.symbol(0x400), "malloc");
    assert_eq!(
        symbols.frames(BacktraceHash(hashes.deep)),
        ["malloc", "load_level", "run", "main"]
    );
    assert_eq!(symbols.frames(BacktraceHash(hashes.unrooted)), ["tick", "idle"]);
}

#[test]
fn test_unnamed_symbol_gets_hex_placeholder() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");

    let mut spec = common::DumpSpec::new(4);
    spec.symbol(0xabcd, "");
    let bt = spec.backtrace(&[0xabcd]);
    spec.block(0x1000, 32, bt);
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();

    assert_eq!(symbols.symbol(0xabcd), "000000000000abcd");
    assert_eq!(symbols.frames(BacktraceHash(bt)), ["000000000000abcd"]);
}

#[test]
fn test_any_truncation_fails_the_whole_load() {
    let dir = tempdir().unwrap();
    let (spec, _) = sample_dump();
    let bytes = spec.encode();

    // Sweep a set of cut points across every segment of the file. The
    // descriptor (or the load) must fail and no partial state may stick.
    for cut in [20, 47, 60, 100, bytes.len() / 2, bytes.len() - 144, bytes.len() - 1] {
        let path = dir.path().join(format!("cut_{cut}.mdump"));
        std::fs::write(&path, &bytes[..cut]).unwrap();

        match MemorySnapshot::from_file(&path) {
            Err(_) => {} // rejected at descriptor time (size mismatch)
            Ok(mut snapshot) => {
                let mut symbols = SymbolTable::new();
                assert!(snapshot.load(&mut symbols).is_err(), "cut at {cut} must fail");
                assert!(!snapshot.is_loaded());
                assert!(snapshot.blocks().is_empty());
                assert!(snapshot.block_map().is_empty());
            }
        }
    }
}

#[test]
fn test_truncation_after_descriptor_fails_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    let bytes = spec.encode();
    std::fs::write(&path, &bytes).unwrap();

    // Descriptor validates against the intact file...
    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();

    // ...then the file shrinks underneath it (e.g. bad copy). The load
    // must fail all-or-nothing and retain no partial state.
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    let mut symbols = SymbolTable::new();
    assert!(snapshot.load(&mut symbols).is_err());
    assert!(!snapshot.is_loaded());
    assert!(snapshot.blocks().is_empty());
}

#[test]
fn test_inconsistent_segment_sum_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    let mut bytes = spec.encode();

    // Bump the declared backtrace depth; the file length and total_size
    // still agree, but the segments no longer add up.
    let depth = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
    bytes[28..32].copy_from_slice(&(depth + 1).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let err = MemorySnapshot::from_file(&path).unwrap_err();
    assert!(matches!(err, SnapshotError::SegmentSumMismatch { .. }));
}

#[test]
fn test_hostile_block_count_swapped_in_after_descriptor() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    let bytes = spec.encode();
    std::fs::write(&path, &bytes).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();

    // Same byte length, but the header now declares u32::MAX blocks. The
    // load must fail from the re-read header instead of allocating a
    // block vector from the count.
    let mut swapped = bytes.clone();
    swapped[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(&path, &swapped).unwrap();

    let mut symbols = SymbolTable::new();
    let err = snapshot.load(&mut symbols).unwrap_err();
    assert!(matches!(err, SnapshotError::SegmentSumMismatch { .. }));
    assert!(!snapshot.is_loaded());
    assert!(snapshot.blocks().is_empty());
}

#[test]
fn test_real_name_upgrades_placeholder_across_dumps() {
    let dir = tempdir().unwrap();

    // Dump A has no name for 0x400; dump B (a different call path, so a
    // different backtrace hash) carries the real one.
    let mut unnamed = common::DumpSpec::new(4);
    unnamed.symbol(0x400, "");
    let bt_a = unnamed.backtrace(&[0x400]);
    unnamed.block(0x1000, 32, bt_a);

    let mut named = common::DumpSpec::new(4);
    named.symbol(0x400, "malloc").symbol(0x100, "main");
    let bt_b = named.backtrace(&[0x400, 0x100]);
    named.block(0x2000, 16, bt_b);

    let path_a = dir.path().join("snapshot_001.mdump");
    let path_b = dir.path().join("snapshot_002.mdump");
    std::fs::write(&path_a, unnamed.encode()).unwrap();
    std::fs::write(&path_b, named.encode()).unwrap();

    let mut symbols = SymbolTable::new();
    let mut first = MemorySnapshot::from_file(&path_a).unwrap();
    first.load(&mut symbols).unwrap();
    assert_eq!(symbols.symbol(0x400), "0000000000000400");

    let mut second = MemorySnapshot::from_file(&path_b).unwrap();
    second.load(&mut symbols).unwrap();
    assert_eq!(symbols.symbol(0x400), "malloc");
    assert_eq!(symbols.frames(BacktraceHash(bt_b)), ["malloc", "main"]);
}

#[test]
fn test_appended_garbage_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    let mut bytes = spec.encode();
    bytes.extend_from_slice(&[0xAA; 32]);
    std::fs::write(&path, &bytes).unwrap();

    // File size no longer matches the declared total size.
    assert!(MemorySnapshot::from_file(&path).is_err());
}

#[test]
fn test_block_map_groups_by_backtrace_hash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, hashes) = sample_dump();
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();
    snapshot.build_block_map();

    let map = snapshot.block_map();
    assert_eq!(map.len(), 3);
    assert_eq!(map[&BacktraceHash(hashes.deep)].len(), 2);
    assert_eq!(map[&BacktraceHash(hashes.shallow)].len(), 1);
    assert_eq!(map[&BacktraceHash(hashes.unrooted)].len(), 1);

    let deep_bytes: u32 = map[&BacktraceHash(hashes.deep)].iter().map(|b| b.size).sum();
    assert_eq!(deep_bytes, 128);
}

#[test]
fn test_unload_keeps_descriptor_and_allows_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();
    snapshot.build_block_map();

    snapshot.unload();
    assert!(!snapshot.is_loaded());
    assert!(snapshot.blocks().is_empty());
    assert!(snapshot.block_map().is_empty());
    assert_eq!(snapshot.block_count(), 4); // descriptor survives

    // Re-load on demand; symbol registration is idempotent.
    snapshot.load(&mut symbols).unwrap();
    assert!(snapshot.is_loaded());
    assert_eq!(snapshot.blocks().len(), 4);
}
