//! # heapscope - Remote Memory-Profiling Session Engine
//!
//! heapscope ingests time-series allocation statistics and point-in-time
//! heap snapshots streamed from an instrumented process, persists them
//! durably, and reconstructs call-stack aggregation trees ("branches")
//! from raw backtrace data for reporting.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Instrumented Process                        │
//! │          (in-process allocation instrumentation)             │
//! └───────────────────────┬──────────────────────────────────────┘
//!                         │ ordered transport callbacks
//!                         ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 heapscope (This Crate)                       │
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐    │
//! │  │  Snapshot    │──▶│  Profiling   │──▶│  Session     │    │
//! │  │  Ingest      │   │  Session     │   │  Log         │    │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘    │
//! │                            │                                 │
//! │                            ▼                                 │
//! │  ┌──────────────┐   ┌──────────────┐                        │
//! │  │  Symbol      │◀──│  Snapshot    │                        │
//! │  │  Table       │   │  Store       │                        │
//! │  └──────┬───────┘   └──────┬───────┘                        │
//! │         └─────────┬────────┘                                 │
//! │                   ▼                                          │
//! │          ┌──────────────┐                                    │
//! │          │  Branch      │  (call-tree aggregation)           │
//! │          │  Builder     │                                    │
//! │          └──────────────┘                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: orchestration — the per-run [`session::ProfilingSession`],
//!   the crash-resilient [`session::SessionLog`], and the four transport
//!   callbacks (connection established/lost, stat batch, snapshot chunk)
//! - [`snapshot`]: the dump store with lazy load/unload and the chunked
//!   transfer reassembler
//! - [`symbols`]: per-session symbol/backtrace deduplication index
//! - [`analysis`]: deterministic branch-tree aggregation of memory blocks
//!   by call path
//! - [`stats`]: time-series sample models and the device/config blobs
//! - [`domain`]: newtypes and structured errors
//! - [`cli`]: argument parsing for the offline inspection binary
//!
//! The binary file layouts themselves (log header, dump records) live in
//! the `heapscope-common` crate, shared with the producer side.
//!
//! ## Concurrency Model
//!
//! One logical owner thread per session: every mutating operation runs on
//! the thread driving the transport callbacks, and file I/O blocks that
//! thread. The engine is an offline/attached tool, not a hot path of the
//! profiled process, so nothing here is internally synchronized.

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod symbols;
