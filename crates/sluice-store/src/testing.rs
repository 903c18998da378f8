//! Test doubles for outage scenarios.

use crate::error::{TierError, TierResult};
use crate::sqlite::SqliteTier;
use crate::tier::PrimaryTier;
use async_trait::async_trait;
use sluice_core::{
    CanonicalKey, EmbeddingField, Enrichment, ProcessedRecord, RecordQuery, ScoredRecord,
    SourceKind,
};
use sluice_db::Database;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) fn record(path: &str, title: &str) -> ProcessedRecord {
    ProcessedRecord::new(
        CanonicalKey::new("article", path).unwrap(),
        SourceKind::Article,
        format!("https://{}", path),
        format!("body of {}", title),
    )
    .with_enrichment(Enrichment::new(title, format!("about {}", title), "summary"))
}

/// A SQLite primary tier that can be switched off.
pub(crate) struct FlakyTier {
    inner: SqliteTier,
    reachable: AtomicBool,
}

impl FlakyTier {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteTier::new(Database::open_in_memory().unwrap()),
            reachable: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn inner(&self) -> &SqliteTier {
        &self.inner
    }

    fn check(&self) -> TierResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TierError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl PrimaryTier for FlakyTier {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn ping(&self) -> TierResult<()> {
        self.check()?;
        self.inner.ping().await
    }

    async fn get(&self, key: &CanonicalKey) -> TierResult<Option<ProcessedRecord>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn insert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn upsert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
        self.check()?;
        self.inner.upsert(record).await
    }

    async fn insert_if_newer(&self, record: &ProcessedRecord) -> TierResult<bool> {
        self.check()?;
        self.inner.insert_if_newer(record).await
    }

    async fn delete(&self, key: &CanonicalKey) -> TierResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn query(&self, query: &RecordQuery) -> TierResult<Vec<ProcessedRecord>> {
        self.check()?;
        self.inner.query(query).await
    }

    async fn semantic_search(
        &self,
        vector: &[f32],
        field: EmbeddingField,
        limit: usize,
        kind: Option<SourceKind>,
    ) -> TierResult<Vec<ScoredRecord>> {
        self.check()?;
        self.inner.semantic_search(vector, field, limit, kind).await
    }

    async fn existing_keys(&self, keys: &[CanonicalKey]) -> TierResult<Vec<CanonicalKey>> {
        self.check()?;
        self.inner.existing_keys(keys).await
    }
}
