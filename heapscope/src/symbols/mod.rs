//! Symbol and backtrace deduplication
//!
//! One [`SymbolTable`] is owned by each profiling session (never global
//! state), so sessions can coexist and be tested in isolation.

pub mod table;

pub use table::{placeholder_name, SymbolTable};
