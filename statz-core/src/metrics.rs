//! Runtime metrics for the statistics cache.
//!
//! Cache operations bump lock-free `AtomicU64` counters in the hot path.
//! Merge latencies go into a small ring buffer guarded by a
//! `parking_lot::Mutex`, read only when exporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for cache activity.
#[derive(Debug)]
pub struct CacheCounters {
    /// Raw overwrites through `register`.
    pub registers: AtomicU64,
    /// Calls to `add` that were accepted.
    pub adds: AtomicU64,
    /// Adds that merged into an existing entry.
    pub merges: AtomicU64,
    /// Adds retried because the entry changed while merging.
    pub conflicts: AtomicU64,
    /// Calls rejected because no data was supplied.
    pub rejected: AtomicU64,
    /// Reads that found cached data.
    pub hits: AtomicU64,
    /// Reads that found nothing.
    pub misses: AtomicU64,
    /// Entities evicted through `remove` or `clear`.
    pub removals: AtomicU64,
    /// Events skipped by suppression before reaching the cache.
    pub suppressed: AtomicU64,
    /// Entity snapshots written to durable storage.
    pub saves_completed: AtomicU64,
    /// Entity snapshots that failed to save.
    pub save_failures: AtomicU64,
}

impl CacheCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: AtomicU64::new(0),
            adds: AtomicU64::new(0),
            merges: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
        }
    }

    /// Increment one counter.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            registers: self.registers.load(Ordering::Relaxed),
            adds: self.adds.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Raw overwrites.
    pub registers: u64,
    /// Accepted adds.
    pub adds: u64,
    /// Adds that merged.
    pub merges: u64,
    /// Retried adds.
    pub conflicts: u64,
    /// Rejected calls.
    pub rejected: u64,
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Evicted entities.
    pub removals: u64,
    /// Suppressed events.
    pub suppressed: u64,
    /// Completed saves.
    pub saves_completed: u64,
    /// Failed saves.
    pub save_failures: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 11] = [
            ("statz_cache_registers_total", "Raw cache overwrites", self.registers),
            ("statz_cache_adds_total", "Accepted cache adds", self.adds),
            ("statz_cache_merges_total", "Adds merged into existing data", self.merges),
            ("statz_cache_conflicts_total", "Adds retried after a concurrent update", self.conflicts),
            ("statz_cache_rejected_total", "Calls rejected for absent data", self.rejected),
            ("statz_cache_hits_total", "Reads that found cached data", self.hits),
            ("statz_cache_misses_total", "Reads that found nothing", self.misses),
            ("statz_cache_removals_total", "Entities evicted from the cache", self.removals),
            ("statz_events_suppressed_total", "Events skipped by region suppression", self.suppressed),
            ("statz_saves_completed_total", "Entity snapshots saved", self.saves_completed),
            ("statz_save_failures_total", "Entity snapshots that failed to save", self.save_failures),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Latency Monitor
// ---------------------------------------------------------------------------

/// Ring buffer of recent operation latencies.
#[derive(Debug)]
pub struct LatencyMonitor {
    history: Mutex<LatencyHistory>,
}

#[derive(Debug)]
struct LatencyHistory {
    /// Recent timings in milliseconds.
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
}

impl LatencyMonitor {
    /// Create a monitor remembering the last `capacity` timings.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(LatencyHistory {
                timings: vec![0.0; capacity.max(1)],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Record one operation.
    pub fn record(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut h = self.history.lock();
        let idx = h.write_idx;
        let len = h.timings.len();
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % len;
        h.count += 1;
    }

    /// Total number of operations recorded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.history.lock().count
    }

    /// P50, P95, P99 and max over the buffered timings (milliseconds).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn percentiles(&self) -> LatencyPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(h.timings.len());
        if n == 0 {
            return LatencyPercentiles::default();
        }

        let mut sorted = h.timings[..n].to_vec();
        sorted.sort_by(f64::total_cmp);

        LatencyPercentiles {
            p50: sorted[n / 2],
            p95: sorted[((n as f64 * 0.95) as usize).min(n - 1)],
            p99: sorted[((n as f64 * 0.99) as usize).min(n - 1)],
            max: sorted[n - 1],
        }
    }
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Percentile statistics for operation timings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyPercentiles {
    /// Median in milliseconds.
    pub p50: f64,
    /// 95th percentile in milliseconds.
    pub p95: f64,
    /// 99th percentile in milliseconds.
    pub p99: f64,
    /// Maximum observed.
    pub max: f64,
}

impl LatencyPercentiles {
    /// Format as a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "P50={:.3}ms  P95={:.3}ms  P99={:.3}ms  Max={:.3}ms",
            self.p50, self.p95, self.p99, self.max
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Cache add (read-merge-write).
    pub const CACHE_ADD: &str = "statz::cache::add";
    /// Event recording pipeline.
    pub const RECORD_EVENT: &str = "statz::record";
    /// Background flush pass.
    pub const FLUSH: &str = "statz::flush";
    /// Persistence save.
    pub const PERSIST_SAVE: &str = "statz::persist::save";
    /// Persistence load.
    pub const PERSIST_LOAD: &str = "statz::persist::load";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
