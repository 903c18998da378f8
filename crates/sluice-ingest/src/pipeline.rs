//! The pipeline orchestrator.

use crate::error::{IngestError, IngestResult};
use crate::identity::{RawInput, SourceIdentity};
use crate::lease::{follow, Lease, LeaseTable};
use crate::registry::StrategyRegistry;
use crate::strategy::{EnrichmentOutput, Extracted, StrategyTriple};
use serde::{Deserialize, Serialize};
use sluice_config::PipelineConfig;
use sluice_core::ProcessedRecord;
use sluice_store::TieredStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where one key is in its pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    Resolving,
    Extracting,
    Enriching,
    Persisting,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Enriching => "enriching",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `process` treats the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheDirective {
    /// Return a stored record when one exists.
    #[default]
    UseCache,
    /// Recompute and overwrite the stored record.
    BypassCache,
    /// Recompute without reading or writing the store.
    NoPersist,
}

/// Per-call options for [`Orchestrator::process`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub cache: CacheDirective,
    /// Overrides the configured extraction timeout.
    pub extract_timeout: Option<Duration>,
    /// Overrides the configured enrichment timeout.
    pub enrich_timeout: Option<Duration>,
    /// Labels stored on the record.
    pub tags: Vec<String>,
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: CacheDirective) -> Self {
        self.cache = cache;
        self
    }

    pub fn bypass_cache(self) -> Self {
        self.with_cache(CacheDirective::BypassCache)
    }

    pub fn no_persist(self) -> Self {
        self.with_cache(CacheDirective::NoPersist)
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = Some(timeout);
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = Some(timeout);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Runs inputs through identify, extract, enrich and persist.
///
/// A canonical key is extracted and enriched at most once while its record
/// is cached; concurrent callers for the same key share one run.
pub struct Orchestrator {
    registry: Arc<StrategyRegistry>,
    store: Arc<TieredStore>,
    config: PipelineConfig,
    leases: LeaseTable,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        store: Arc<TieredStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            leases: LeaseTable::new(),
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TieredStore> {
        &self.store
    }

    /// Keys with a pipeline run in progress.
    pub fn active_leases(&self) -> usize {
        self.leases.active()
    }

    /// Process one input into a complete record.
    pub async fn process(
        &self,
        input: RawInput,
        options: ProcessOptions,
    ) -> IngestResult<ProcessedRecord> {
        trace_stage(&input, PipelineStage::Resolving);
        let (triple, identity) = self.registry.resolve_with_identity(&input)?;
        let key = identity.key.clone();
        let use_cache = options.cache == CacheDirective::UseCache;

        loop {
            if use_cache {
                if let Some(record) = self.store.get(&key).await? {
                    debug!("Cache hit for {}", key);
                    return Ok(record);
                }
            }

            match self.leases.acquire(&key) {
                Lease::Leader(guard) => {
                    // The previous leader may have persisted after our lookup
                    if use_cache {
                        if let Some(record) = self.store.peek(&key).await? {
                            let outcome = Ok(record);
                            guard.publish(&outcome);
                            return outcome;
                        }
                    }

                    let outcome = self.run(triple, &identity, &options).await;
                    match &outcome {
                        Ok(_) => trace_stage(&key, PipelineStage::Done),
                        Err(e) => {
                            trace_stage(&key, PipelineStage::Failed);
                            warn!("Processing {} failed: {}", key, e);
                        }
                    }
                    guard.publish(&outcome);
                    return outcome;
                }
                Lease::Follower(slot) => {
                    debug!("Waiting on in-flight run for {}", key);
                    match follow(slot).await {
                        Some(outcome) => return outcome,
                        None => {
                            debug!("Run for {} was abandoned, retrying", key);
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// Extract, enrich and persist. Nothing is written unless both stages
    /// succeed.
    async fn run(
        &self,
        triple: &StrategyTriple,
        identity: &SourceIdentity,
        options: &ProcessOptions,
    ) -> IngestResult<ProcessedRecord> {
        let key = &identity.key;

        trace_stage(key, PipelineStage::Extracting);
        let extract_timeout = options
            .extract_timeout
            .unwrap_or_else(|| self.config.extract_timeout());
        let extracted = with_timeout(
            PipelineStage::Extracting,
            extract_timeout,
            triple.extractor.extract(identity),
        )
        .await?;

        trace_stage(key, PipelineStage::Enriching);
        let enrich_timeout = options
            .enrich_timeout
            .unwrap_or_else(|| self.config.enrich_timeout());
        let enriched = with_timeout(
            PipelineStage::Enriching,
            enrich_timeout,
            triple.enricher.enrich(identity, &extracted),
        )
        .await?;

        let record = assemble(identity, extracted, enriched, &options.tags);

        trace_stage(key, PipelineStage::Persisting);
        let stored = match options.cache {
            CacheDirective::NoPersist => record,
            CacheDirective::BypassCache => self.store.put(&record).await?,
            CacheDirective::UseCache => match self.store.insert(&record).await {
                Ok(stored) => stored,
                Err(e) if e.is_conflict() => {
                    // Another writer got there first; theirs is the record
                    info!("{} was written concurrently, using stored copy", key);
                    self.store
                        .peek(key)
                        .await?
                        .ok_or_else(|| IngestError::Persistence(e.to_string()))?
                }
                Err(e) => return Err(e.into()),
            },
        };

        info!("Processed {} ({})", key, identity.kind);
        Ok(stored)
    }
}

fn trace_stage(subject: &dyn fmt::Display, stage: PipelineStage) {
    debug!("{} -> {}", subject, stage);
}

async fn with_timeout<T>(
    stage: PipelineStage,
    after: Duration,
    fut: impl Future<Output = IngestResult<T>>,
) -> IngestResult<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::Timeout { stage, after }),
    }
}

fn assemble(
    identity: &SourceIdentity,
    extracted: Extracted,
    enriched: EnrichmentOutput,
    tags: &[String],
) -> ProcessedRecord {
    let mut enrichment = enriched.enrichment;
    if enrichment.title.is_empty() {
        if let Some(hint) = extracted.title_hint {
            enrichment.title = hint;
        }
    }

    let mut metadata = extracted.metadata;
    metadata.insert(
        "fingerprint".to_string(),
        serde_json::Value::String(identity.fingerprint.clone()),
    );

    let mut record = ProcessedRecord::new(
        identity.key.clone(),
        identity.kind,
        identity.original.clone(),
        extracted.text,
    )
    .with_metadata(metadata)
    .with_enrichment(enrichment)
    .with_tags(tags.to_vec());

    if let Some(embeddings) = enriched.embeddings {
        record = record.with_embeddings(embeddings);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentityError;
    use crate::identity::fingerprint;
    use crate::strategy::{Enricher, Extractor};
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use sluice_core::{
        CanonicalKey, EmbeddingField, Enrichment, RecordQuery, ScoredRecord, SourceKind,
    };
    use sluice_db::Database;
    use sluice_store::{PrimaryTier, SqliteTier, TierError, TierResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExtractor {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        async fn extract(&self, _source: &SourceIdentity) -> IngestResult<Extracted> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(IngestError::extraction("upstream returned 503", true));
            }
            Ok(Extracted::new(format!("body {}", n)).with_title("Mock title"))
        }
    }

    #[derive(Default)]
    struct CountingEnricher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Enricher for CountingEnricher {
        async fn enrich(
            &self,
            _source: &SourceIdentity,
            extracted: &Extracted,
        ) -> IngestResult<EnrichmentOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IngestError::enrichment("model refused", false));
            }
            Ok(EnrichmentOutput::new(Enrichment::new(
                "",
                format!("about {}", extracted.text),
                "summary",
            )))
        }
    }

    /// Writes the same key through the store mid-run, like another process.
    struct RacingExtractor {
        store: Arc<TieredStore>,
    }

    #[async_trait]
    impl Extractor for RacingExtractor {
        async fn extract(&self, source: &SourceIdentity) -> IngestResult<Extracted> {
            let winner = ProcessedRecord::new(
                source.key.clone(),
                source.kind,
                source.original.clone(),
                "from elsewhere",
            );
            self.store.insert(&winner).await?;
            Ok(Extracted::new("ours"))
        }
    }

    async fn store() -> Arc<TieredStore> {
        let primary = Arc::new(SqliteTier::new(Database::open_in_memory().unwrap()));
        Arc::new(
            TieredStore::open(primary, Database::open_in_memory().unwrap(), 3)
                .await
                .unwrap(),
        )
    }

    /// A primary that never answers.
    struct UnreachableTier;

    fn refused<T>() -> TierResult<T> {
        Err(TierError::Unavailable("connection refused".to_string()))
    }

    #[async_trait]
    impl PrimaryTier for UnreachableTier {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn ping(&self) -> TierResult<()> {
            refused()
        }

        async fn get(&self, _key: &CanonicalKey) -> TierResult<Option<ProcessedRecord>> {
            refused()
        }

        async fn insert(&self, _record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
            refused()
        }

        async fn upsert(&self, _record: &ProcessedRecord) -> TierResult<ProcessedRecord> {
            refused()
        }

        async fn insert_if_newer(&self, _record: &ProcessedRecord) -> TierResult<bool> {
            refused()
        }

        async fn delete(&self, _key: &CanonicalKey) -> TierResult<bool> {
            refused()
        }

        async fn query(&self, _query: &RecordQuery) -> TierResult<Vec<ProcessedRecord>> {
            refused()
        }

        async fn semantic_search(
            &self,
            _vector: &[f32],
            _field: EmbeddingField,
            _limit: usize,
            _kind: Option<SourceKind>,
        ) -> TierResult<Vec<ScoredRecord>> {
            refused()
        }

        async fn existing_keys(&self, _keys: &[CanonicalKey]) -> TierResult<Vec<CanonicalKey>> {
            refused()
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        store: Arc<TieredStore>,
        extractor: Arc<CountingExtractor>,
        enricher: Arc<CountingEnricher>,
    }

    impl Harness {
        async fn new(extractor: CountingExtractor, enricher: CountingEnricher) -> Self {
            let store = store().await;
            let extractor = Arc::new(extractor);
            let enricher = Arc::new(enricher);
            let registry = StrategyRegistry::builder()
                .register_builtin(extractor.clone(), enricher.clone())
                .build();
            let orchestrator = Arc::new(Orchestrator::new(
                Arc::new(registry),
                store.clone(),
                PipelineConfig::default(),
            ));
            Self {
                orchestrator,
                store,
                extractor,
                enricher,
            }
        }

        async fn plain() -> Self {
            Self::new(CountingExtractor::default(), CountingEnricher::default()).await
        }

        fn extractions(&self) -> usize {
            self.extractor.calls.load(Ordering::SeqCst)
        }

        fn enrichments(&self) -> usize {
            self.enricher.calls.load(Ordering::SeqCst)
        }
    }

    const URL: &str = "https://example.com/post";

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let h = Harness::plain().await;

        let first = h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();
        let second = h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.raw_text, second.raw_text);
        assert_eq!(first.enrichment, second.enrichment);
        assert_eq!(first.enrichment.title, "Mock title");
        assert_eq!(h.extractions(), 1);
        assert_eq!(h.enrichments(), 1);
        assert_eq!(h.store.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_equivalent_urls_share_one_record() {
        let h = Harness::plain().await;

        let a = h
            .orchestrator
            .process("https://Example.COM/post?utm_source=newsletter".into(), ProcessOptions::new())
            .await
            .unwrap();
        let b = h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();

        assert_eq!(a.key, b.key);
        assert_eq!(a.key.as_str(), "article:///example.com/post");
        assert_eq!(h.extractions(), 1);
        assert_eq!(a.original_source, "https://Example.COM/post?utm_source=newsletter");
    }

    #[tokio::test]
    async fn test_fifty_concurrent_calls_run_once() {
        let h = Harness::new(
            CountingExtractor {
                delay: Some(Duration::from_millis(50)),
                ..Default::default()
            },
            CountingEnricher::default(),
        )
        .await;

        let calls = (0..50).map(|_| h.orchestrator.process(URL.into(), ProcessOptions::new()));
        let results = join_all(calls).await;

        assert_eq!(h.extractions(), 1);
        assert_eq!(h.enrichments(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            let record = result.as_ref().unwrap();
            assert_eq!(record.key, first.key);
            assert_eq!(record.raw_text, first.raw_text);
            assert_eq!(record.enrichment, first.enrichment);
        }
        assert_eq!(h.orchestrator.active_leases(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_a_failure() {
        let h = Harness::new(
            CountingExtractor {
                delay: Some(Duration::from_millis(200)),
                fail: true,
                ..Default::default()
            },
            CountingEnricher::default(),
        )
        .await;

        let calls = (0..10).map(|_| h.orchestrator.process(URL.into(), ProcessOptions::new()));
        let results = join_all(calls).await;

        assert_eq!(h.extractions(), 1);
        for result in results {
            let err = result.unwrap_err();
            assert!(matches!(err, IngestError::Extraction { retryable: true, .. }));
        }
    }

    #[tokio::test]
    async fn test_enrichment_failure_persists_nothing() {
        let h = Harness::new(
            CountingExtractor::default(),
            CountingEnricher {
                fail: true,
                ..Default::default()
            },
        )
        .await;

        let err = h
            .orchestrator
            .process(URL.into(), ProcessOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Enrichment { retryable: false, .. }));
        assert!(!err.is_retryable());
        assert_eq!(h.extractions(), 1);

        let key = CanonicalKey::parse("article:///example.com/post").unwrap();
        assert!(h.store.get(&key).await.unwrap().is_none());
        assert_eq!(h.store.pending_sync().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extraction_timeout() {
        let h = Harness::new(
            CountingExtractor {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            CountingEnricher::default(),
        )
        .await;

        let options = ProcessOptions::new().with_extract_timeout(Duration::from_millis(20));
        let err = h.orchestrator.process(URL.into(), options).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Timeout {
                stage: PipelineStage::Extracting,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(h.enrichments(), 0);
        assert_eq!(h.orchestrator.active_leases(), 0);
    }

    #[tokio::test]
    async fn test_bypass_cache_recomputes_and_overwrites() {
        let h = Harness::plain().await;

        let first = h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();
        let second = h
            .orchestrator
            .process(URL.into(), ProcessOptions::new().bypass_cache())
            .await
            .unwrap();

        assert_eq!(h.extractions(), 2);
        assert_eq!(first.raw_text, "body 1");
        assert_eq!(second.raw_text, "body 2");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        let cached = h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();
        assert_eq!(cached.raw_text, "body 2");
        assert_eq!(h.extractions(), 2);
    }

    #[tokio::test]
    async fn test_no_persist_leaves_store_untouched() {
        let h = Harness::plain().await;

        let record = h
            .orchestrator
            .process(URL.into(), ProcessOptions::new().no_persist())
            .await
            .unwrap();
        assert_eq!(record.raw_text, "body 1");
        assert!(h.store.get(&record.key).await.unwrap().is_none());

        h.orchestrator.process(URL.into(), ProcessOptions::new()).await.unwrap();
        assert_eq!(h.extractions(), 2);
    }

    #[tokio::test]
    async fn test_unknown_input_is_an_identity_error() {
        let h = Harness::plain().await;

        let err = h
            .orchestrator
            .process("not a source at all".into(), ProcessOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Identity(IdentityError::NoMatchingScheme(_))
        ));
        assert_eq!(h.extractions(), 0);
    }

    #[tokio::test]
    async fn test_aborted_leader_releases_the_key() {
        let h = Harness::new(
            CountingExtractor {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            CountingEnricher::default(),
        )
        .await;

        let orchestrator = h.orchestrator.clone();
        let handle = tokio::spawn(async move {
            orchestrator.process(URL.into(), ProcessOptions::new()).await
        });
        for _ in 0..100 {
            if h.orchestrator.active_leases() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.orchestrator.active_leases(), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(h.orchestrator.active_leases(), 0);

        let err = h
            .orchestrator
            .process(URL.into(), ProcessOptions::new().with_extract_timeout(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
        assert_eq!(h.extractions(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_writer_wins() {
        let store = store().await;
        let registry = StrategyRegistry::builder()
            .register_builtin(
                Arc::new(RacingExtractor {
                    store: store.clone(),
                }),
                Arc::new(CountingEnricher::default()),
            )
            .build();
        let orchestrator =
            Orchestrator::new(Arc::new(registry), store.clone(), PipelineConfig::default());

        let record = orchestrator
            .process(URL.into(), ProcessOptions::new())
            .await
            .unwrap();
        assert_eq!(record.raw_text, "from elsewhere");

        let stored = store.get(&record.key).await.unwrap().unwrap();
        assert_eq!(stored.raw_text, "from elsewhere");
    }

    #[tokio::test]
    async fn test_tags_and_fingerprint_are_stored() {
        let h = Harness::plain().await;
        let options = ProcessOptions::new().with_tags(vec!["rust".into(), "async".into()]);

        let record = h.orchestrator.process(URL.into(), options).await.unwrap();
        let stored = h.store.get(&record.key).await.unwrap().unwrap();

        assert_eq!(stored.tags, vec!["rust", "async"]);
        assert_eq!(stored.source_kind, SourceKind::Article);
        assert_eq!(
            stored.metadata.get("fingerprint").and_then(|v| v.as_str()),
            Some(fingerprint(b"article:///example.com/post").as_str())
        );
    }

    #[tokio::test]
    async fn test_content_key_survives_restart() {
        let bytes = b"# Meeting notes\n\nShip it.".to_vec();

        let first = Harness::plain().await;
        let a = first
            .orchestrator
            .process(RawInput::payload("notes.md", bytes.clone()), ProcessOptions::new())
            .await
            .unwrap();

        let restarted = Harness::plain().await;
        let b = restarted
            .orchestrator
            .process(RawInput::payload("copy-of-notes.md", bytes.clone()), ProcessOptions::new())
            .await
            .unwrap();

        assert_eq!(a.key, b.key);
        assert_eq!(a.key.as_str(), format!("text:///md/{}", fingerprint(&bytes)));
        assert_eq!(a.source_kind, SourceKind::Text);
    }

    #[tokio::test]
    async fn test_unwritable_tiers_fail_without_retry() {
        let fallback = Database::open_in_memory().unwrap();
        let store = Arc::new(
            TieredStore::open(Arc::new(UnreachableTier), fallback.clone(), 3)
                .await
                .unwrap(),
        );
        // Reads still work; the queue write inside the fallback transaction fails
        fallback
            .conn()
            .unwrap()
            .execute_batch("DROP TABLE sync_queue;")
            .unwrap();

        let extractor = Arc::new(CountingExtractor::default());
        let registry = StrategyRegistry::builder()
            .register_builtin(extractor.clone(), Arc::new(CountingEnricher::default()))
            .build();
        let orchestrator =
            Orchestrator::new(Arc::new(registry), store.clone(), PipelineConfig::default());

        let err = orchestrator
            .process(URL.into(), ProcessOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)), "{:?}", err);
        assert!(!err.is_retryable());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        // The record write rolled back with the queue write
        let key = orchestrator.registry().canonicalize(&URL.into()).unwrap();
        assert!(fallback.get_record(&key).unwrap().is_none());
        assert_eq!(store.stats().fallback_writes, 0);
        assert_eq!(orchestrator.active_leases(), 0);
    }
}
