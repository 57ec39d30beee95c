//! Call-tree aggregation of snapshot memory blocks.
//!
//! Groups loaded blocks by shared call path under a set of requested root
//! frame names, producing a deterministic report tree.

pub mod branch;

pub use branch::{build_branch, BranchNode, BranchTree, ROOT};
