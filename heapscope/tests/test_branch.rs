//! Branch tree construction: aggregation invariants, determinism, and
//! unattributed accounting.

mod common;

use common::sample_dump;
use heapscope::analysis::{build_branch, BranchTree, ROOT};
use heapscope::snapshot::MemorySnapshot;
use heapscope::symbols::SymbolTable;
use tempfile::tempdir;

fn loaded_sample() -> (MemorySnapshot, SymbolTable) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let (spec, _) = sample_dump();
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();
    snapshot.build_block_map();
    // keep the tempdir alive via the path inside snapshot; the file is
    // already fully read, so dropping the dir handle here is fine
    (snapshot, symbols)
}

fn roots(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_tree_shape_from_sample_dump() {
    let (snapshot, symbols) = loaded_sample();
    let tree = build_branch(&snapshot, &symbols, &roots(&["main"]));

    // main → run → {load_level → malloc, malloc}
    let main = tree.child_named(ROOT, "main").unwrap();
    let run = tree.child_named(main, "run").unwrap();
    let load_level = tree.child_named(run, "load_level").unwrap();
    let deep_malloc = tree.child_named(load_level, "malloc").unwrap();
    let shallow_malloc = tree.child_named(run, "malloc").unwrap();

    assert_eq!(tree.node(deep_malloc).blocks.len(), 2);
    assert_eq!(tree.node(deep_malloc).allocated_bytes, 128);
    assert_eq!(tree.node(shallow_malloc).blocks.len(), 1);
    assert_eq!(tree.node(shallow_malloc).allocated_bytes, 64);

    // Ancestors aggregate their whole subtree.
    assert_eq!(tree.node(run).allocated_bytes, 192);
    assert_eq!(tree.node(run).block_count, 3);
    assert_eq!(tree.node(main).allocated_bytes, 192);
    assert_eq!(tree.root().allocated_bytes, 192);
    assert_eq!(tree.root().block_count, 3);
}

#[test]
fn test_unmatched_groups_are_counted_not_dropped() {
    let (snapshot, symbols) = loaded_sample();
    let tree = build_branch(&snapshot, &symbols, &roots(&["main"]));

    // The idle/tick group matches no requested root.
    assert_eq!(tree.unattributed_blocks, 1);
    assert_eq!(tree.unattributed_bytes, 8);

    // With "idle" also requested, nothing is left unattributed.
    let tree = build_branch(&snapshot, &symbols, &roots(&["main", "idle"]));
    assert_eq!(tree.unattributed_blocks, 0);
    assert_eq!(tree.root().allocated_bytes, 200);
    assert_eq!(tree.root().block_count, 4);
}

#[test]
fn test_aggregation_invariant_holds_everywhere() {
    let (snapshot, symbols) = loaded_sample();
    let tree = build_branch(&snapshot, &symbols, &roots(&["main", "idle"]));

    fn check(tree: &BranchTree, index: usize) {
        let node = tree.node(index);
        if !node.children.is_empty() {
            let child_bytes: u64 =
                node.children.iter().map(|&c| tree.node(c).allocated_bytes).sum();
            let leaf_bytes: u64 = node.blocks.iter().map(|b| u64::from(b.size)).sum();
            assert_eq!(node.allocated_bytes, child_bytes + leaf_bytes);
        }
        for &child in &node.children {
            assert_eq!(tree.node(child).parent, Some(index));
            check(tree, child);
        }
    }
    check(&tree, ROOT);
}

#[test]
fn test_build_is_deterministic() {
    let (snapshot, symbols) = loaded_sample();
    let first = build_branch(&snapshot, &symbols, &roots(&["main", "idle"]));
    let second = build_branch(&snapshot, &symbols, &roots(&["main", "idle"]));

    fn compare(a: &BranchTree, ai: usize, b: &BranchTree, bi: usize) {
        assert_eq!(a.node(ai).name, b.node(bi).name);
        assert_eq!(a.node(ai).allocated_bytes, b.node(bi).allocated_bytes);
        assert_eq!(a.node(ai).block_count, b.node(bi).block_count);
        assert_eq!(a.node(ai).children.len(), b.node(bi).children.len());
        for (&ac, &bc) in a.node(ai).children.iter().zip(&b.node(bi).children) {
            compare(a, ac, b, bc);
        }
    }
    assert_eq!(first.len(), second.len());
    compare(&first, ROOT, &second, ROOT);
}

#[test]
fn test_children_are_sorted_lexicographically() {
    let (snapshot, symbols) = loaded_sample();
    let tree = build_branch(&snapshot, &symbols, &roots(&["main"]));

    let run = tree
        .child_named(tree.child_named(ROOT, "main").unwrap(), "run")
        .unwrap();
    let names: Vec<&str> = tree
        .node(run)
        .children
        .iter()
        .map(|&c| tree.node(c).name.as_deref().unwrap())
        .collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert_eq!(names, ["load_level", "malloc"]);
}

#[test]
fn test_outermost_root_occurrence_anchors_the_path() {
    // A recursive-looking path where the root name appears twice:
    // frames (innermost→outermost): malloc, helper, main, wrapper, main.
    // The scan runs outermost→innermost, so the OUTER "main" anchors the
    // path and the inner occurrence becomes a regular tree level.
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot_001.mdump");
    let mut spec = common::DumpSpec::new(8);
    spec.symbol(0x1, "malloc")
        .symbol(0x2, "helper")
        .symbol(0x3, "main")
        .symbol(0x4, "wrapper");
    let bt = spec.backtrace(&[0x1, 0x2, 0x3, 0x4, 0x3]);
    spec.block(0x9000, 40, bt);
    std::fs::write(&path, spec.encode()).unwrap();

    let mut snapshot = MemorySnapshot::from_file(&path).unwrap();
    let mut symbols = SymbolTable::new();
    snapshot.load(&mut symbols).unwrap();
    snapshot.build_block_map();

    let tree = build_branch(&snapshot, &symbols, &roots(&["main"]));
    let outer_main = tree.child_named(ROOT, "main").unwrap();
    let wrapper = tree.child_named(outer_main, "wrapper").unwrap();
    let inner_main = tree.child_named(wrapper, "main").unwrap();
    let helper = tree.child_named(inner_main, "helper").unwrap();
    let malloc = tree.child_named(helper, "malloc").unwrap();
    assert_eq!(tree.node(malloc).allocated_bytes, 40);
    assert_eq!(tree.root().allocated_bytes, 40);
}

#[test]
fn test_render_mentions_totals_and_unattributed() {
    let (snapshot, symbols) = loaded_sample();
    let tree = build_branch(&snapshot, &symbols, &roots(&["main"]));
    let text = tree.render();
    assert!(text.contains("total: 192 bytes in 3 blocks"));
    assert!(text.contains("unattributed: 8 bytes in 1 blocks"));
    assert!(text.contains("main"));
    assert!(text.contains("load_level"));
}
