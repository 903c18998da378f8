//! Extraction and enrichment contracts.

use crate::error::IngestResult;
use crate::identity::SourceIdentity;
use crate::parsers::Parser;
use async_trait::async_trait;
use sluice_core::{EmbeddingVectors, Enrichment};
use std::sync::Arc;

/// Raw content pulled from a source.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    /// The main text content.
    pub text: String,
    /// Title found during extraction, if any.
    pub title_hint: Option<String>,
    /// Source-specific metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Extracted {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title_hint = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Descriptive fields and vectors produced from extracted content.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutput {
    pub enrichment: Enrichment,
    pub embeddings: Option<EmbeddingVectors>,
}

impl EnrichmentOutput {
    pub fn new(enrichment: Enrichment) -> Self {
        Self {
            enrichment,
            embeddings: None,
        }
    }

    pub fn with_embeddings(mut self, embeddings: EmbeddingVectors) -> Self {
        self.embeddings = Some(embeddings);
        self
    }
}

/// Pulls content for a resolved source.
///
/// Implementations own their retry policy. A returned error is final for
/// the current `process` call.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, source: &SourceIdentity) -> IngestResult<Extracted>;
}

/// Derives descriptive fields from extracted content.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        source: &SourceIdentity,
        extracted: &Extracted,
    ) -> IngestResult<EnrichmentOutput>;
}

/// The parser, extractor and enricher registered for one scheme.
#[derive(Clone)]
pub struct StrategyTriple {
    pub parser: Arc<dyn Parser>,
    pub extractor: Arc<dyn Extractor>,
    pub enricher: Arc<dyn Enricher>,
}

impl StrategyTriple {
    pub fn new(
        parser: Arc<dyn Parser>,
        extractor: Arc<dyn Extractor>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        Self {
            parser,
            extractor,
            enricher,
        }
    }

    pub fn scheme(&self) -> &'static str {
        self.parser.scheme()
    }
}

impl std::fmt::Debug for StrategyTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyTriple")
            .field("scheme", &self.scheme())
            .finish_non_exhaustive()
    }
}
