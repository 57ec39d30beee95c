//! Branch tree construction.
//!
//! For every backtrace group in a loaded snapshot, the builder scans the
//! frames from the outermost end for the first name in the requested root
//! set, then walks inward creating or reusing one node per frame. The
//! group's blocks land on the innermost node reached and the byte/block
//! totals propagate to every ancestor, so each node's totals equal the
//! sum of its subtree. Children are sorted lexicographically at the end
//! for stable report ordering.
//!
//! The tree is an index-based arena: nodes own their children by index
//! and keep a parent index for upward propagation, which sidesteps any
//! cyclic-ownership question. Trees are rebuilt from scratch on every
//! request and never persisted.
//!
//! Groups whose backtrace hash is unknown, or whose frames match no
//! requested root, are excluded from the tree; their totals are surfaced
//! on [`BranchTree`] as `unattributed_bytes`/`unattributed_blocks`
//! instead of being dropped silently.

use crate::snapshot::{MemoryBlock, MemorySnapshot};
use crate::symbols::SymbolTable;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Index of the synthetic root node in every [`BranchTree`].
pub const ROOT: usize = 0;

/// One node of the aggregation tree.
#[derive(Debug)]
pub struct BranchNode {
    /// Frame name; `None` only for the synthetic root.
    pub name: Option<String>,
    /// Parent index; `None` only for the synthetic root.
    pub parent: Option<usize>,
    /// Child indices, sorted lexicographically by name after the build.
    pub children: Vec<usize>,
    /// Total bytes of every block in this subtree.
    pub allocated_bytes: u64,
    /// Total block count of this subtree.
    pub block_count: usize,
    /// Blocks whose call path ends exactly here (deepest node reached).
    pub blocks: Vec<MemoryBlock>,
}

impl BranchNode {
    fn new(name: Option<String>, parent: Option<usize>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            allocated_bytes: 0,
            block_count: 0,
            blocks: Vec::new(),
        }
    }
}

/// Arena-allocated call tree with per-node aggregates.
#[derive(Debug)]
pub struct BranchTree {
    nodes: Vec<BranchNode>,
    /// Bytes in groups excluded from the tree (unknown backtrace or no
    /// root-name match).
    pub unattributed_bytes: u64,
    /// Blocks in groups excluded from the tree.
    pub unattributed_blocks: usize,
}

impl BranchTree {
    fn new() -> Self {
        Self {
            nodes: vec![BranchNode::new(None, None)],
            unattributed_bytes: 0,
            unattributed_blocks: 0,
        }
    }

    #[must_use]
    pub fn root(&self) -> &BranchNode {
        &self.nodes[ROOT]
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &BranchNode {
        &self.nodes[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        // the synthetic root is always present
        self.nodes.len() == 1
    }

    /// Child of `parent` named `name`, if present.
    #[must_use]
    pub fn child_named(&self, parent: usize, name: &str) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name.as_deref() == Some(name))
    }

    fn child_or_insert(&mut self, parent: usize, name: &str) -> usize {
        if let Some(existing) = self.child_named(parent, name) {
            return existing;
        }
        let index = self.nodes.len();
        self.nodes.push(BranchNode::new(Some(name.to_string()), Some(parent)));
        self.nodes[parent].children.push(index);
        index
    }

    fn add_group(&mut self, leaf: usize, blocks: &[MemoryBlock]) {
        let bytes: u64 = blocks.iter().map(|b| u64::from(b.size)).sum();
        self.nodes[leaf].blocks.extend_from_slice(blocks);

        let mut cursor = Some(leaf);
        while let Some(index) = cursor {
            self.nodes[index].allocated_bytes += bytes;
            self.nodes[index].block_count += blocks.len();
            cursor = self.nodes[index].parent;
        }
    }

    fn sort_children(&mut self) {
        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            children.sort_by(|&a, &b| self.nodes[a].name.cmp(&self.nodes[b].name));
            self.nodes[index].children = children;
        }
    }

    /// Plain-text rendering for reports and the CLI.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let root = self.root();
        let _ = writeln!(out, "total: {} bytes in {} blocks", root.allocated_bytes, root.block_count);
        for &child in &root.children {
            self.render_node(&mut out, child, 1);
        }
        if self.unattributed_blocks > 0 {
            let _ = writeln!(
                out,
                "unattributed: {} bytes in {} blocks",
                self.unattributed_bytes, self.unattributed_blocks
            );
        }
        out
    }

    fn render_node(&self, out: &mut String, index: usize, depth: usize) {
        let node = &self.nodes[index];
        let name = node.name.as_deref().unwrap_or("?");
        let _ = writeln!(
            out,
            "{:indent$}{} - {} bytes, {} blocks",
            "",
            name,
            node.allocated_bytes,
            node.block_count,
            indent = depth * 2
        );
        for &child in &node.children {
            self.render_node(out, child, depth + 1);
        }
    }
}

/// Build the aggregation tree for one loaded snapshot.
///
/// Deterministic: groups iterate in backtrace-hash order, the root match
/// is the first hit scanning outermost → innermost, and children are
/// sorted by name. Rebuilding from the same snapshot and root set yields
/// a structurally identical tree.
#[must_use]
pub fn build_branch(
    snapshot: &MemorySnapshot,
    symbols: &SymbolTable,
    root_names: &[String],
) -> BranchTree {
    let roots: HashSet<&str> = root_names.iter().map(String::as_str).collect();
    let mut tree = BranchTree::new();

    for (&hash, blocks) in snapshot.block_map() {
        if blocks.is_empty() {
            continue;
        }
        let frames = symbols.frames(hash);
        if frames.is_empty() {
            tree.unattributed_bytes += blocks.iter().map(|b| u64::from(b.size)).sum::<u64>();
            tree.unattributed_blocks += blocks.len();
            continue;
        }

        // Frames are innermost-first; scan from the outermost end for the
        // first requested root name.
        let Some(start) = (0..frames.len()).rev().find(|&i| roots.contains(frames[i].as_str()))
        else {
            tree.unattributed_bytes += blocks.iter().map(|b| u64::from(b.size)).sum::<u64>();
            tree.unattributed_blocks += blocks.len();
            continue;
        };

        // Walk inward from the matched root to the allocation site,
        // creating one node per frame. Distinct hashes with the same
        // name sequence collapse onto the same path.
        let mut node = ROOT;
        for i in (0..=start).rev() {
            node = tree.child_or_insert(node, &frames[i]);
        }
        tree.add_group(node, blocks);
    }

    tree.sort_children();
    tree
}
