//! Session orchestration
//!
//! - [`SessionLog`] - append-only, crash-resilient binary log of stat items
//! - [`ProfilingSession`] - owns the symbol table, the log, the snapshot
//!   descriptors, and the four transport callbacks

pub mod log;
pub mod session;

pub use self::log::{load_log_file, LoadedLog, SessionLog};
pub use session::ProfilingSession;

/// File name of the per-session statistics log.
pub const LOG_FILE_NAME: &str = "session.mlog";
