//! Cache counters.
//!
//! Kept as atomics for cheap snapshots and mirrored to the `metrics` facade
//! so any installed recorder (Prometheus, statsd, ...) picks them up.

use metrics::{describe_counter, describe_gauge};
use sluice_core::CacheStats;
use std::sync::atomic::{AtomicU64, Ordering};

const HITS: &str = "sluice_cache_hits_total";
const MISSES: &str = "sluice_cache_misses_total";
const FALLBACK_WRITES: &str = "sluice_fallback_writes_total";
const MIGRATIONS: &str = "sluice_migrations_total";
const MIGRATION_FAILURES: &str = "sluice_migration_failures_total";
const PENDING_SYNC: &str = "sluice_pending_sync";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(HITS, "Lookups answered from a storage tier");
    describe_counter!(MISSES, "Lookups that found no stored record");
    describe_counter!(FALLBACK_WRITES, "Writes diverted to the fallback store");
    describe_counter!(MIGRATIONS, "Records migrated from fallback to primary");
    describe_counter!(MIGRATION_FAILURES, "Failed migration attempts");
    describe_gauge!(PENDING_SYNC, "Fallback records awaiting migration");
}

/// Read-only counters for the tiered store and reconciler.
#[derive(Debug, Default)]
pub struct Telemetry {
    hits: AtomicU64,
    misses: AtomicU64,
    fallback_writes: AtomicU64,
    migrations: AtomicU64,
    migration_failures: AtomicU64,
    pending_sync: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(HITS).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MISSES).increment(1);
    }

    pub fn record_fallback_write(&self) {
        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(FALLBACK_WRITES).increment(1);
    }

    pub fn record_migration(&self) {
        self.migrations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MIGRATIONS).increment(1);
    }

    pub fn record_migration_failure(&self) {
        self.migration_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MIGRATION_FAILURES).increment(1);
    }

    pub fn set_pending_sync(&self, depth: u64) {
        self.pending_sync.store(depth, Ordering::Relaxed);
        metrics::gauge!(PENDING_SYNC).set(depth as f64);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            migration_failures: self.migration_failures.load(Ordering::Relaxed),
            pending_sync: self.pending_sync.load(Ordering::Relaxed),
        }
    }
}
