//! The primary tier contract.

use crate::error::TierResult;
use async_trait::async_trait;
use sluice_core::{
    CanonicalKey, EmbeddingField, ProcessedRecord, RecordQuery, ScoredRecord, SourceKind,
};

/// A durable, queryable record repository.
///
/// Implementations report connectivity failures as
/// [`TierError::Unavailable`](crate::TierError::Unavailable) and uniqueness
/// rejections as [`TierError::Conflict`](crate::TierError::Conflict); the
/// tiered store relies on that distinction.
#[async_trait]
pub trait PrimaryTier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Check reachability.
    async fn ping(&self) -> TierResult<()>;

    async fn get(&self, key: &CanonicalKey) -> TierResult<Option<ProcessedRecord>>;

    /// Insert a new record; fails with `Conflict` if the key exists.
    async fn insert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord>;

    /// Insert or replace, keeping the stored `created_at` and bumping `updated_at`.
    async fn upsert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord>;

    /// Store a record verbatim unless the tier holds the same or a newer
    /// version. Returns whether it was written.
    async fn insert_if_newer(&self, record: &ProcessedRecord) -> TierResult<bool>;

    /// Delete by key. Returns whether a record was removed.
    async fn delete(&self, key: &CanonicalKey) -> TierResult<bool>;

    async fn query(&self, query: &RecordQuery) -> TierResult<Vec<ProcessedRecord>>;

    /// Nearest records by cosine similarity on one embedding column.
    async fn semantic_search(
        &self,
        vector: &[f32],
        field: EmbeddingField,
        limit: usize,
        kind: Option<SourceKind>,
    ) -> TierResult<Vec<ScoredRecord>>;

    /// Which of `keys` this tier holds.
    async fn existing_keys(&self, keys: &[CanonicalKey]) -> TierResult<Vec<CanonicalKey>>;
}
