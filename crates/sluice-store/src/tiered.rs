//! The store abstraction: one surface over the primary and fallback tiers.

use crate::error::{StoreError, StoreResult, SyncError, TierError};
use crate::sqlite::blocking;
use crate::telemetry::Telemetry;
use crate::tier::PrimaryTier;
use chrono::{DateTime, Utc};
use sluice_core::{
    CacheStats, CanonicalKey, EmbeddingField, ProcessedRecord, RecordQuery, ScoredRecord,
    SourceKind, SyncQueueEntry, TierMarker,
};
use sluice_db::{CleanupOutcome, Database, DbError, WriteMode};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Result of one migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The record now lives in the primary tier.
    Migrated,
    /// The primary already held the same or a newer version.
    Superseded,
    /// The entry was no longer pending; nothing was done.
    Skipped,
}

/// Marks a migration in progress for the duration of its lifetime.
///
/// Bumps the epoch before releasing so a concurrent `get` that missed in
/// both tiers can tell a move happened underneath it.
struct MigrationGuard<'a> {
    store: &'a TieredStore,
}

impl<'a> MigrationGuard<'a> {
    fn enter(store: &'a TieredStore) -> Self {
        store.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { store }
    }
}

impl Drop for MigrationGuard<'_> {
    fn drop(&mut self) {
        self.store.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Primary tier with transparent fall-through to an embedded fallback.
///
/// Callers never see which tier answered. Writes that cannot reach the
/// primary land in the fallback together with a sync-queue entry.
pub struct TieredStore {
    primary: Arc<dyn PrimaryTier>,
    fallback: Database,
    dimensions: usize,
    telemetry: Telemetry,
    in_flight: AtomicUsize,
    epoch: AtomicU64,
    fallback_written: Notify,
}

impl TieredStore {
    /// Combine the tiers. `dimensions` is the fixed embedding size.
    pub async fn open(
        primary: Arc<dyn PrimaryTier>,
        fallback: Database,
        dimensions: usize,
    ) -> StoreResult<Self> {
        let store = Self {
            primary,
            fallback,
            dimensions,
            telemetry: Telemetry::new(),
            in_flight: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            fallback_written: Notify::new(),
        };

        let pending = store.refresh_pending().await?;
        info!(
            "Tiered store ready (primary: {}, {} records pending sync)",
            store.primary.name(),
            pending
        );
        Ok(store)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.telemetry.snapshot()
    }

    /// Resolves after the next write diverted to the fallback.
    pub async fn fallback_written(&self) {
        self.fallback_written.notified().await
    }

    /// Look up a record, counting a cache hit or miss.
    pub async fn get(&self, key: &CanonicalKey) -> StoreResult<Option<ProcessedRecord>> {
        let found = self.peek(key).await?;
        match found {
            Some(_) => self.telemetry.record_hit(),
            None => self.telemetry.record_miss(),
        }
        Ok(found)
    }

    /// Look up a record without touching the hit/miss counters.
    pub async fn peek(&self, key: &CanonicalKey) -> StoreResult<Option<ProcessedRecord>> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        match self.primary.get(key).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) if e.is_unavailable() => {
                debug!("Primary unavailable for get {}, using fallback: {}", key, e);
            }
            Err(e) => return Err(StoreError::Primary(e)),
        }

        let owned = key.clone();
        if let Some(record) = blocking(&self.fallback, move |db| db.get_record(&owned)).await? {
            return Ok(Some(record));
        }

        // A migration may have moved the record between the two reads
        if self.in_flight.load(Ordering::SeqCst) > 0 || self.epoch.load(Ordering::SeqCst) != epoch
        {
            match self.primary.get(key).await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_unavailable() => {}
                Err(e) => return Err(StoreError::Primary(e)),
            }
        }

        Ok(None)
    }

    /// Insert a new record. A key already in the primary yields
    /// [`StoreError::Conflict`]. The fallback is only consulted when the
    /// primary is unreachable, and then a key already there conflicts too.
    pub async fn insert(&self, record: &ProcessedRecord) -> StoreResult<ProcessedRecord> {
        self.validate(record)?;

        match self.primary.insert(record).await {
            Ok(stored) => Ok(stored),
            Err(TierError::Conflict(key)) => Err(StoreError::Conflict(key)),
            Err(e) if e.is_unavailable() => {
                self.write_fallback(record, WriteMode::InsertOnly, e).await
            }
            Err(e) => Err(StoreError::Primary(e)),
        }
    }

    /// Insert or replace, bumping `updated_at`.
    pub async fn put(&self, record: &ProcessedRecord) -> StoreResult<ProcessedRecord> {
        self.validate(record)?;

        match self.primary.upsert(record).await {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_unavailable() => self.write_fallback(record, WriteMode::Upsert, e).await,
            Err(e) => Err(StoreError::Primary(e)),
        }
    }

    async fn write_fallback(
        &self,
        record: &ProcessedRecord,
        mode: WriteMode,
        primary_err: TierError,
    ) -> StoreResult<ProcessedRecord> {
        warn!(
            "Primary unavailable, writing {} to fallback: {}",
            record.key, primary_err
        );

        let owned = record.clone();
        let stored = match blocking(&self.fallback, move |db| db.write_pending(&owned, mode)).await
        {
            Ok(stored) => stored,
            Err(DbError::Conflict(key)) => return Err(StoreError::Conflict(key)),
            Err(e) => {
                return Err(StoreError::Persistence {
                    key: record.key.to_string(),
                    primary: primary_err.to_string(),
                    fallback: e.to_string(),
                })
            }
        };

        self.telemetry.record_fallback_write();
        if let Err(e) = self.refresh_pending().await {
            warn!("Could not refresh pending-sync depth: {}", e);
        }
        self.fallback_written.notify_one();

        Ok(stored)
    }

    /// Delete a key from both tiers. Returns whether anything was removed.
    pub async fn delete(&self, key: &CanonicalKey) -> StoreResult<bool> {
        let from_primary = match self.primary.delete(key).await {
            Ok(removed) => removed,
            Err(e) if e.is_unavailable() => {
                warn!("Primary unavailable, {} deleted from fallback only: {}", key, e);
                false
            }
            Err(e) => return Err(StoreError::Primary(e)),
        };

        let owned = key.clone();
        let from_fallback = blocking(&self.fallback, move |db| match db.delete_record(&owned) {
            Ok(()) => Ok(true),
            Err(DbError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        })
        .await?;

        if from_fallback {
            self.refresh_pending().await?;
        }

        Ok(from_primary || from_fallback)
    }

    /// Structured query across both tiers.
    pub async fn query(&self, query: &RecordQuery) -> StoreResult<Vec<ProcessedRecord>> {
        let primary = match self.primary.query(query).await {
            Ok(records) => records,
            Err(e) if e.is_unavailable() => {
                debug!("Primary unavailable for query, fallback only: {}", e);
                Vec::new()
            }
            Err(e) => return Err(StoreError::Primary(e)),
        };

        let owned = query.clone();
        let fallback = blocking(&self.fallback, move |db| db.query_records(&owned)).await?;

        let mut merged = newest_per_key(primary.into_iter().chain(fallback), |r| r);
        query.sort_records(&mut merged);
        merged.truncate(query.limit);
        Ok(merged)
    }

    /// Nearest records by embedding similarity across both tiers.
    pub async fn semantic_search(
        &self,
        vector: &[f32],
        field: EmbeddingField,
        limit: usize,
    ) -> StoreResult<Vec<ScoredRecord>> {
        self.semantic_search_kind(vector, field, limit, None).await
    }

    /// Like [`Self::semantic_search`], restricted to one source kind.
    pub async fn semantic_search_kind(
        &self,
        vector: &[f32],
        field: EmbeddingField,
        limit: usize,
        kind: Option<SourceKind>,
    ) -> StoreResult<Vec<ScoredRecord>> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch(
                sluice_core::Error::DimensionMismatch {
                    field: field.as_str(),
                    expected: self.dimensions,
                    actual: vector.len(),
                },
            ));
        }

        let primary = match self.primary.semantic_search(vector, field, limit, kind).await {
            Ok(results) => results,
            Err(e) if e.is_unavailable() => {
                debug!("Primary unavailable for semantic search, fallback only: {}", e);
                Vec::new()
            }
            Err(e) => return Err(StoreError::Primary(e)),
        };

        let owned = vector.to_vec();
        let fallback = blocking(&self.fallback, move |db| {
            db.similar_records(&owned, field, limit, kind)
        })
        .await?;

        let mut merged = newest_per_key(primary.into_iter().chain(fallback), |s| &s.record);
        merged.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(CmpOrdering::Equal)
        });
        merged.truncate(limit);
        Ok(merged)
    }

    /// Which tier currently holds a key.
    pub async fn locate(&self, key: &CanonicalKey) -> StoreResult<Option<TierMarker>> {
        let owned = key.clone();
        let local = blocking(&self.fallback, move |db| {
            let entry = db.sync_entry(&owned)?;
            let exists = entry.is_some() || db.record_exists(&owned)?;
            Ok((entry, exists))
        })
        .await?;

        match local {
            (Some(entry), _) => return Ok(Some(entry.status.tier_marker())),
            (None, true) => return Ok(Some(TierMarker::FallbackPending)),
            (None, false) => {}
        }

        match self.primary.get(key).await {
            Ok(Some(_)) => Ok(Some(TierMarker::Primary)),
            Ok(None) => Ok(None),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(StoreError::Primary(e)),
        }
    }

    /// Most recently created record in either tier.
    pub async fn last_processed(&self) -> StoreResult<Option<ProcessedRecord>> {
        let records = self.query(&RecordQuery::new().with_limit(1)).await?;
        Ok(records.into_iter().next())
    }

    /// Which of `keys` are stored in either tier.
    pub async fn existing_keys(&self, keys: &[CanonicalKey]) -> StoreResult<Vec<CanonicalKey>> {
        let mut found = match self.primary.existing_keys(keys).await {
            Ok(found) => found,
            Err(e) if e.is_unavailable() => Vec::new(),
            Err(e) => return Err(StoreError::Primary(e)),
        };

        let owned = keys.to_vec();
        let local = blocking(&self.fallback, move |db| db.existing_keys(&owned)).await?;
        for key in local {
            if !found.contains(&key) {
                found.push(key);
            }
        }

        Ok(keys.iter().filter(|k| found.contains(k)).cloned().collect())
    }

    /// Number of fallback records awaiting migration.
    pub async fn pending_sync(&self) -> StoreResult<u64> {
        Ok(blocking(&self.fallback, |db| db.pending_sync_count()).await?)
    }

    /// Pending entries whose backoff has elapsed, oldest first.
    pub async fn next_eligible(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SyncQueueEntry>, SyncError> {
        Ok(blocking(&self.fallback, move |db| db.next_eligible(now, limit)).await?)
    }

    /// Put an entry back to pending after a failed attempt.
    pub async fn reschedule(
        &self,
        key: &CanonicalKey,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), SyncError> {
        let owned = key.clone();
        let error = error.to_string();
        blocking(&self.fallback, move |db| {
            db.reschedule(&owned, attempts, next_attempt_at, &error)
        })
        .await?;
        Ok(())
    }

    /// Return entries stuck in `migrating` after a crash to `pending`.
    pub async fn reset_migrating(&self) -> Result<usize, SyncError> {
        Ok(blocking(&self.fallback, |db| db.reset_migrating()).await?)
    }

    /// Move one fallback record into the primary tier.
    ///
    /// The primary write and the fallback cleanup happen in that order; a
    /// crash between them leaves the record in both tiers, and the retry
    /// resolves to [`MigrationOutcome::Superseded`].
    pub async fn migrate(&self, entry: &SyncQueueEntry) -> Result<MigrationOutcome, SyncError> {
        let key = entry.key.clone();

        let claim_key = key.clone();
        let record = blocking(&self.fallback, move |db| {
            if !db.mark_migrating(&claim_key)? {
                return Ok(None);
            }
            db.get_record(&claim_key)
        })
        .await?;

        let record = match record {
            Some(record) => record,
            None => {
                debug!("Sync entry {} no longer pending, skipping", key);
                return Ok(MigrationOutcome::Skipped);
            }
        };

        let outcome = {
            let _guard = MigrationGuard::enter(self);

            let written = self.primary.insert_if_newer(&record).await?;

            let cleanup_key = key.clone();
            let migrated_at = record.updated_at;
            let cleanup = blocking(&self.fallback, move |db| {
                db.complete_migration(&cleanup_key, &migrated_at)
            })
            .await?;

            if cleanup == CleanupOutcome::Requeued {
                info!("{} changed during migration, newer version stays queued", key);
            }

            if written {
                MigrationOutcome::Migrated
            } else {
                MigrationOutcome::Superseded
            }
        };

        if outcome == MigrationOutcome::Migrated {
            self.telemetry.record_migration();
        }
        if let Err(e) = self.refresh_pending().await {
            warn!("Could not refresh pending-sync depth: {}", e);
        }

        Ok(outcome)
    }

    fn validate(&self, record: &ProcessedRecord) -> StoreResult<()> {
        record
            .embeddings
            .validate(self.dimensions)
            .map_err(StoreError::DimensionMismatch)
    }

    async fn refresh_pending(&self) -> StoreResult<u64> {
        let depth = blocking(&self.fallback, |db| db.pending_sync_count()).await?;
        self.telemetry.set_pending_sync(depth);
        Ok(depth)
    }
}

/// Deduplicate by key, keeping the version with the newest `updated_at`.
fn newest_per_key<T, F>(items: impl Iterator<Item = T>, record: F) -> Vec<T>
where
    F: Fn(&T) -> &ProcessedRecord,
{
    let mut by_key: HashMap<CanonicalKey, T> = HashMap::new();
    for item in items {
        let key = record(&item).key.clone();
        match by_key.get(&key) {
            Some(existing) if record(existing).updated_at >= record(&item).updated_at => {}
            _ => {
                by_key.insert(key, item);
            }
        }
    }
    by_key.into_values().collect()
}
