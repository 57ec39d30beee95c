//! # heapscope - Main Entry Point
//!
//! Offline inspector for persisted profiling sessions: load a session
//! directory, print the statistics summary, and optionally build a branch
//! report for one snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use heapscope::cli::Args;
use heapscope::session::ProfilingSession;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut session = ProfilingSession::load_from_dir(&args.session_dir)
        .with_context(|| format!("failed to load session from {}", args.session_dir.display()))?;

    print_summary(&session);
    if args.full_stats {
        print_stat_items(&session);
    }

    if let Some(index) = args.snapshot {
        anyhow::ensure!(
            !args.roots.is_empty(),
            "a branch report needs at least one --root frame name"
        );
        let tree = session
            .build_branch(index, &args.roots)
            .with_context(|| format!("failed to build branch for snapshot {index}"))?;
        println!();
        print!("{}", tree.render());
    }

    Ok(())
}

fn print_summary(session: &ProfilingSession) {
    let device = session.device();
    println!("device:    {} {} ({})", device.manufacturer, device.model, device.name);
    println!("pools:     {}", session.pool_names().join(", "));
    println!("tags:      {}", session.tag_names().join(", "));
    println!("items:     {}", session.stat_item_count());
    println!("snapshots: {}", session.snapshot_count());
    for index in 0..session.snapshot_count() {
        if let Some(snapshot) = session.snapshot(index) {
            println!(
                "  [{}] {} - {} blocks, {} symbols, {} backtraces, {} bytes",
                index,
                snapshot.path().display(),
                snapshot.block_count(),
                snapshot.symbol_count(),
                snapshot.backtrace_count(),
                snapshot.total_size()
            );
        }
    }
}

fn print_stat_items(session: &ProfilingSession) {
    for (index, item) in session.stat_items().iter().enumerate() {
        println!(
            "item[{index}] t={} total={} bytes {}",
            item.timestamp,
            item.total_allocated(),
            item.active_tags
        );
    }
}
