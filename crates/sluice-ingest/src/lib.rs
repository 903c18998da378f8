//! Sluice Ingest - content-addressed ingestion pipeline.
//!
//! This crate provides:
//! - Canonical identity for URLs, external ids, files and payloads
//! - A priority-ordered registry of per-scheme strategies
//! - The orchestrator: cache check, per-key single-flight, extract, enrich, persist
//! - Built-in local text extraction and excerpt enrichment

mod enrich;
mod error;
mod extract;
pub mod identity;
mod lease;
pub mod parsers;
mod pipeline;
mod registry;
mod strategy;

pub use enrich::ExcerptEnricher;
pub use error::{IdentityError, IdentityResult, IngestError, IngestResult};
pub use extract::LocalTextExtractor;
pub use identity::{fingerprint, normalize_url, RawInput, SourceIdentity, FINGERPRINT_LEN};
pub use parsers::Parser;
pub use pipeline::{CacheDirective, Orchestrator, PipelineStage, ProcessOptions};
pub use registry::{RegistryBuilder, StrategyRegistry};
pub use strategy::{Enricher, EnrichmentOutput, Extracted, Extractor, StrategyTriple};
