//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "heapscope",
    about = "Inspect persisted memory-profiling sessions",
    after_help = "\
EXAMPLES:
    heapscope ./sessions/Acme\\ Phone/dev\\ {UDID}/2026-08-30\\ 101500
        Print the session summary (stat items, snapshots)

    heapscope <SESSION_DIR> --snapshot 0 --root main --root WinMain
        Build and print the call tree of snapshot 0 rooted at main/WinMain"
)]
pub struct Args {
    /// Session storage directory (contains session.mlog and dumps)
    #[arg(value_name = "SESSION_DIR")]
    pub session_dir: PathBuf,

    /// Snapshot index to analyze (triggers a branch report)
    #[arg(long, value_name = "INDEX")]
    pub snapshot: Option<usize>,

    /// Root frame name for the branch report (repeatable)
    #[arg(long = "root", value_name = "NAME")]
    pub roots: Vec<String>,

    /// Print every stat item instead of the summary line
    #[arg(long)]
    pub full_stats: bool,
}
