//! Background migration of fallback-resident records into the primary tier.

use crate::error::SyncError;
use crate::tiered::{MigrationOutcome, TieredStore};
use chrono::Utc;
use rand::Rng;
use sluice_config::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome counts of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub migrated: usize,
    pub superseded: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.migrated == 0 && self.superseded == 0 && self.failed == 0
    }

    fn attempted(&self) -> usize {
        self.migrated + self.superseded + self.failed
    }
}

/// Delay before retry number `attempts + 1`.
///
/// `min(base * 2^attempts, max)` plus uniform jitter in
/// `[0, delay * jitter_ratio)`.
pub(crate) fn backoff_delay(config: &SyncConfig, attempts: u32) -> Duration {
    let max = config.max_backoff();
    let delay = 1u32
        .checked_shl(attempts)
        .and_then(|factor| config.base_backoff().checked_mul(factor))
        .map_or(max, |delay| delay.min(max));

    let jitter = delay.mul_f64(config.jitter_ratio * rand::thread_rng().gen::<f64>());
    delay + jitter
}

/// Drains the sync queue. One instance per process.
pub struct Reconciler {
    store: Arc<TieredStore>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(store: Arc<TieredStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Attempt every eligible entry once, oldest first.
    ///
    /// Stops early when the primary is unreachable; remaining entries keep
    /// their schedule.
    pub async fn run_once(&self) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();
        let entries = self
            .store
            .next_eligible(Utc::now(), self.config.batch_size)
            .await?;

        for entry in entries {
            match self.store.migrate(&entry).await {
                Ok(MigrationOutcome::Migrated) => {
                    debug!("Migrated {}", entry.key);
                    report.migrated += 1;
                }
                Ok(MigrationOutcome::Superseded) => {
                    debug!("{} already newer in primary, dropped local copy", entry.key);
                    report.superseded += 1;
                }
                Ok(MigrationOutcome::Skipped) => {}
                Err(e) => {
                    report.failed += 1;
                    self.store.telemetry().record_migration_failure();

                    let attempts = entry.attempts.saturating_add(1);
                    let delay = backoff_delay(&self.config, entry.attempts);
                    let next = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(1));
                    warn!(
                        "Migration of {} failed (attempt {}), retrying in {:?}: {}",
                        entry.key, attempts, delay, e
                    );

                    if let Err(reschedule_err) = self
                        .store
                        .reschedule(&entry.key, attempts, next, &e.to_string())
                        .await
                    {
                        error!("Could not reschedule {}: {}", entry.key, reschedule_err);
                    }

                    if e.is_unavailable() {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Run until `cancel` fires, waking on the poll interval or whenever a
    /// write lands in the fallback.
    pub async fn run(&self, cancel: CancellationToken) {
        match self.store.reset_migrating().await {
            Ok(0) => {}
            Ok(count) => info!("Reset {} interrupted migrations to pending", count),
            Err(e) => warn!("Could not reset interrupted migrations: {}", e),
        }

        info!(
            "Reconciler started (poll every {:?})",
            self.config.poll_interval()
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => {
                    info!(
                        "Reconcile pass: {} migrated, {} superseded, {} failed",
                        report.migrated, report.superseded, report.failed
                    );
                    // A full batch without failures means more may be waiting
                    if report.failed == 0 && report.attempted() >= self.config.batch_size {
                        continue;
                    }
                }
                Err(e) => warn!("Reconcile pass failed: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = self.store.fallback_written() => {}
            }
        }

        info!("Reconciler stopped");
    }

    /// Run on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, FlakyTier};
    use sluice_core::TierMarker;
    use sluice_db::Database;

    fn config() -> SyncConfig {
        SyncConfig {
            poll_interval_seconds: 1,
            base_backoff_ms: 100,
            max_backoff_seconds: 1,
            jitter_ratio: 0.0,
            batch_size: 8,
        }
    }

    async fn setup() -> (Arc<FlakyTier>, Arc<TieredStore>) {
        let tier = Arc::new(FlakyTier::new());
        let store = TieredStore::open(tier.clone(), Database::open_in_memory().unwrap(), 3)
            .await
            .unwrap();
        (tier, Arc::new(store))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = config();
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(&config, 4), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 40), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let config = SyncConfig {
            jitter_ratio: 0.5,
            ..config()
        };
        for _ in 0..100 {
            let delay = backoff_delay(&config, 1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_fallback_then_reconcile() {
        let (tier, store) = setup().await;
        let reconciler = Reconciler::new(store.clone(), config());
        let rec = record("example.com/post", "Post");

        tier.set_reachable(false);
        store.put(&rec).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.fallback_writes, 1);
        assert_eq!(stats.pending_sync, 1);

        tier.set_reachable(true);
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                migrated: 1,
                superseded: 0,
                failed: 0
            }
        );

        assert_eq!(store.locate(&rec.key).await.unwrap(), Some(TierMarker::Primary));
        assert_eq!(store.get(&rec.key).await.unwrap().unwrap().key, rec.key);
        assert_eq!(store.pending_sync().await.unwrap(), 0);
        assert_eq!(store.stats().migrations, 1);
        assert_eq!(store.stats().pending_sync, 0);
    }

    #[tokio::test]
    async fn test_failure_reschedules_with_backoff() {
        let (tier, store) = setup().await;
        let slow = SyncConfig {
            base_backoff_ms: 10_000,
            max_backoff_seconds: 60,
            ..config()
        };
        let reconciler = Reconciler::new(store.clone(), slow);

        tier.set_reachable(false);
        store.put(&record("example.com/a", "A")).await.unwrap();
        store.put(&record("example.com/b", "B")).await.unwrap();

        let report = reconciler.run_once().await.unwrap();
        // Unreachable primary ends the pass after the first failure
        assert_eq!(report.failed, 1);
        assert_eq!(store.stats().migration_failures, 1);

        let entries = store.next_eligible(Utc::now(), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 0);

        let later = Utc::now() + chrono::Duration::seconds(30);
        let all = store.next_eligible(later, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        let failed = all.iter().find(|e| e.attempts == 1).unwrap();
        assert!(failed.last_error.is_some());

        // Nothing is dropped no matter how often it fails
        assert_eq!(store.pending_sync().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_background_task_drains_queue() {
        let (tier, store) = setup().await;
        let rec = record("example.com/a", "A");

        // Leave an entry stuck in `migrating`, as after a crash
        tier.set_reachable(false);
        store.put(&rec).await.unwrap();
        let entries = store.next_eligible(Utc::now(), 10).await.unwrap();
        assert!(store.migrate(&entries[0]).await.is_err());
        tier.set_reachable(true);

        let cancel = CancellationToken::new();
        let handle = Reconciler::new(store.clone(), config()).spawn(cancel.clone());

        let mut drained = false;
        for _ in 0..50 {
            if store.pending_sync().await.unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        cancel.cancel();
        handle.await.unwrap();

        assert!(drained);
        assert_eq!(store.locate(&rec.key).await.unwrap(), Some(TierMarker::Primary));
    }
}
