//! Usage counters shared across pipeline tasks.
//!
//! Counters are updated from the consolidator, the processor, and the
//! ingestion loop, so they live behind an `Arc` as atomics rather than as
//! loop-local fields.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide usage counters.
#[derive(Debug, Default)]
pub struct UsageStats {
    items_received: AtomicU64,
    singletons_passed: AtomicU64,
    groups_flushed: AtomicU64,
    analysis_failures: AtomicU64,
    drained_at_shutdown: AtomicU64,
}

impl UsageStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_item(&self) {
        self.items_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_singleton(&self) {
        self.singletons_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.groups_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_failure(&self) {
        self.analysis_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drained(&self) {
        self.drained_at_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time copy for logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_received: self.items_received.load(Ordering::Relaxed),
            singletons_passed: self.singletons_passed.load(Ordering::Relaxed),
            groups_flushed: self.groups_flushed.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            drained_at_shutdown: self.drained_at_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub items_received: u64,
    pub singletons_passed: u64,
    pub groups_flushed: u64,
    pub analysis_failures: u64,
    pub drained_at_shutdown: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} items, {} singletons, {} flushed groups ({} drained at shutdown), {} analysis failures",
            self.items_received,
            self.singletons_passed,
            self.groups_flushed,
            self.drained_at_shutdown,
            self.analysis_failures
        )
    }
}
