//! Tuning constants and the small set of knobs a host process must supply.
//!
//! Mirrors the teacher's `manager/config.rs`: a flat module of named
//! constants rather than a sprawling settings struct, plus (since on-disk
//! configuration loading is out of scope here) an `EngineConfig` for the
//! handful of values that genuinely vary per host process.

use std::path::PathBuf;
use std::time::Duration;

/// Warm-up threshold before the batched collector (C6) starts flushing on a
/// timer rather than only on size.
pub const BATCH_WARMUP_COUNT: usize = 50;

/// Maximum time a partially-filled batch sits before being flushed anyway.
pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_secs(4);

/// Maximum number of detailed errors retained per search (prevents memory
/// bloat on pathological trees with many unreadable entries).
pub const MAX_DETAILED_ERRORS: usize = 100;

/// Default cap on results when a query doesn't specify one.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// How long a completed session's cache row survives with no new reader.
pub const COMPLETED_SESSION_RETENTION: Duration = Duration::from_secs(30);

/// How long an active (still-producing) session survives with no reader.
pub const ACTIVE_SESSION_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Interval between sweeps of the session retention reaper.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// How long a streaming request waits for its first result before returning
/// an empty-but-not-yet-complete response to the caller.
pub const FIRST_RESULT_WAIT: Duration = Duration::from_millis(40);

/// Values a host process supplies at startup; everything else in this
/// module is a fixed tuning constant.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the grep binary the driver (C5) spawns. Defaults to
    /// resolving `rg` from `PATH`.
    pub grep_binary: PathBuf,
    /// Ceiling applied to a query's `max_results` regardless of what the
    /// caller asked for.
    pub hard_max_results: usize,
    /// Number of walker threads handed to the `ignore` crate's
    /// `WalkBuilder::threads`. `0` lets `ignore` pick based on available
    /// parallelism.
    pub walker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grep_binary: PathBuf::from("rg"),
            hard_max_results: 50_000,
            walker_threads: 0,
        }
    }
}
