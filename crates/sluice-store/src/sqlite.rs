//! SQLite primary tier.

use crate::error::{TierError, TierResult};
use crate::tier::PrimaryTier;
use async_trait::async_trait;
use sluice_core::{
    CanonicalKey, EmbeddingField, ProcessedRecord, RecordQuery, ScoredRecord, SourceKind,
};
use sluice_db::{Database, DbError, DbResult, WriteMode};

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<T, F>(db: &Database, f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| DbError::Other(format!("blocking task failed: {}", e)))?
}

/// A [`PrimaryTier`] backed by an embedded SQLite database.
///
/// Used for single-machine deployments and as the test double for the
/// PostgreSQL tier.
#[derive(Clone)]
pub struct SqliteTier {
    db: Database,
}

impl SqliteTier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<T, F>(&self, f: F) -> TierResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
    {
        blocking(&self.db, f).await.map_err(TierError::from)
    }
}

#[async_trait]
impl PrimaryTier for SqliteTier {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> TierResult<()> {
        self.run(|db| db.conn().map(|_| ())).await
    }

    async fn get(&self, key: &CanonicalKey) -> TierResult<Option<ProcessedRecord>> {
        let key = key.clone();
        self.run(move |db| db.get_record(&key)).await
    }

    async fn insert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
        let record = record.clone();
        self.run(move |db| db.insert_record(&record)).await
    }

    async fn upsert(&self, record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
        let record = record.clone();
        self.run(move |db| db.write_record(&record, WriteMode::Upsert))
            .await
    }

    async fn insert_if_newer(&self, record: &ProcessedRecord) -> TierResult<bool> {
        let record = record.clone();
        self.run(move |db| db.write_if_newer(&record)).await
    }

    async fn delete(&self, key: &CanonicalKey) -> TierResult<bool> {
        let key = key.clone();
        self.run(move |db| match db.delete_record(&key) {
            Ok(()) => Ok(true),
            Err(DbError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }

    async fn query(&self, query: &RecordQuery) -> TierResult<Vec<ProcessedRecord>> {
        let query = query.clone();
        self.run(move |db| db.query_records(&query)).await
    }

    async fn semantic_search(
        &self,
        vector: &[f32],
        field: EmbeddingField,
        limit: usize,
        kind: Option<SourceKind>,
    ) -> TierResult<Vec<ScoredRecord>> {
        let vector = vector.to_vec();
        self.run(move |db| db.similar_records(&vector, field, limit, kind))
            .await
    }

    async fn existing_keys(&self, keys: &[CanonicalKey]) -> TierResult<Vec<CanonicalKey>> {
        let keys = keys.to_vec();
        self.run(move |db| db.existing_keys(&keys)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> ProcessedRecord {
        ProcessedRecord::new(
            CanonicalKey::new("article", path).unwrap(),
            SourceKind::Article,
            format!("https://{}", path),
            "body",
        )
    }

    #[tokio::test]
    async fn test_sqlite_tier_roundtrip() {
        let tier = SqliteTier::new(Database::open_in_memory().unwrap());
        let rec = record("example.com/post");

        tier.ping().await.unwrap();
        tier.insert(&rec).await.unwrap();
        assert_eq!(tier.get(&rec.key).await.unwrap(), Some(rec.clone()));

        let err = tier.insert(&rec).await.unwrap_err();
        assert!(err.is_conflict());

        let upserted = tier.upsert(&rec).await.unwrap();
        assert_eq!(upserted.created_at, rec.created_at);

        assert!(tier.delete(&rec.key).await.unwrap());
        assert!(!tier.delete(&rec.key).await.unwrap());
        assert!(tier.get(&rec.key).await.unwrap().is_none());
    }
}
