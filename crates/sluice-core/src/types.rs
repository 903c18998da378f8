//! Core domain types for Sluice.

use crate::error::{Error, Result};
use crate::key::CanonicalKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Doc,
    Audio,
    Video,
    Image,
    GitHub,
    YouTube,
    Arxiv,
    Email,
    Obsidian,
    Article,
    Drive,
}

impl SourceKind {
    pub const ALL: [SourceKind; 12] = [
        SourceKind::Text,
        SourceKind::Doc,
        SourceKind::Audio,
        SourceKind::Video,
        SourceKind::Image,
        SourceKind::GitHub,
        SourceKind::YouTube,
        SourceKind::Arxiv,
        SourceKind::Email,
        SourceKind::Obsidian,
        SourceKind::Article,
        SourceKind::Drive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Text => "text",
            SourceKind::Doc => "doc",
            SourceKind::Audio => "audio",
            SourceKind::Video => "video",
            SourceKind::Image => "image",
            SourceKind::GitHub => "github",
            SourceKind::YouTube => "youtube",
            SourceKind::Arxiv => "arxiv",
            SourceKind::Email => "email",
            SourceKind::Obsidian => "obsidian",
            SourceKind::Article => "article",
            SourceKind::Drive => "drive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// URI scheme used for keys of this kind.
    pub fn scheme(&self) -> &'static str {
        self.as_str()
    }

    /// Detect a file-backed source kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            // Plain text, markup and code
            "txt" | "text" | "md" | "markdown" | "org" | "rst" | "log" | "rs" | "py" | "js"
            | "ts" | "go" | "c" | "cpp" | "h" | "java" | "rb" | "sh" | "json" | "yaml"
            | "yml" | "toml" | "html" | "css" | "sql" => Some(SourceKind::Text),
            // Office and print documents
            "pdf" | "doc" | "docx" | "odt" | "rtf" | "pptx" | "xlsx" | "epub" => {
                Some(SourceKind::Doc)
            }
            "mp3" | "wav" | "m4a" | "flac" | "ogg" | "aac" => Some(SourceKind::Audio),
            "mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v" => Some(SourceKind::Video),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" => Some(SourceKind::Image),
            _ => None,
        }
    }

    /// Whether records of this kind are identified by hashing content bytes.
    pub fn is_file_backed(&self) -> bool {
        matches!(
            self,
            SourceKind::Text
                | SourceKind::Doc
                | SourceKind::Audio
                | SourceKind::Video
                | SourceKind::Image
        )
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// LLM-facing descriptive fields produced by the enrichment stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrichment {
    pub title: String,
    pub description: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub entities: Vec<String>,
}

impl Enrichment {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            summary: summary.into(),
            topics: Vec::new(),
            entities: Vec::new(),
        }
    }
}

/// Which embedding column a similarity search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingField {
    Description,
    Summary,
}

impl EmbeddingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingField::Description => "description",
            EmbeddingField::Summary => "summary",
        }
    }

    /// Column holding this embedding in both tiers.
    pub fn column(&self) -> &'static str {
        match self {
            EmbeddingField::Description => "description_embedding",
            EmbeddingField::Summary => "summary_embedding",
        }
    }
}

/// Fixed-dimension vectors for description and summary similarity search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingVectors {
    pub description: Option<Vec<f32>>,
    pub summary: Option<Vec<f32>>,
    pub model: Option<String>,
}

impl EmbeddingVectors {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.summary.is_none()
    }

    pub fn get(&self, field: EmbeddingField) -> Option<&[f32]> {
        match field {
            EmbeddingField::Description => self.description.as_deref(),
            EmbeddingField::Summary => self.summary.as_deref(),
        }
    }

    /// Check every present vector against the store's fixed dimension.
    pub fn validate(&self, dimensions: usize) -> Result<()> {
        for field in [EmbeddingField::Description, EmbeddingField::Summary] {
            if let Some(vector) = self.get(field) {
                if vector.len() != dimensions {
                    return Err(Error::DimensionMismatch {
                        field: field.as_str(),
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The pipeline's output for one logical source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub key: CanonicalKey,
    pub source_kind: SourceKind,
    /// The raw input as the caller supplied it.
    pub original_source: String,
    pub raw_text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub enrichment: Enrichment,
    #[serde(default, skip_serializing_if = "EmbeddingVectors::is_empty")]
    pub embeddings: EmbeddingVectors,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedRecord {
    pub fn new(
        key: CanonicalKey,
        source_kind: SourceKind,
        original_source: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            source_kind,
            original_source: original_source.into(),
            raw_text: raw_text.into(),
            metadata: serde_json::Map::new(),
            enrichment: Enrichment::default(),
            embeddings: EmbeddingVectors::default(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_embeddings(mut self, embeddings: EmbeddingVectors) -> Self {
        self.embeddings = embeddings;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Take over the identity of a stored version this record replaces.
    ///
    /// Keeps the stored `created_at`; `updated_at` ends up no earlier than
    /// either version and no earlier than now.
    pub fn rebase_on(&mut self, created_at: DateTime<Utc>, previous_updated_at: DateTime<Utc>) {
        self.created_at = created_at;
        if previous_updated_at > self.updated_at {
            self.updated_at = previous_updated_at;
        }
        self.touch();
    }

    /// The structured document persisted in the `data` column.
    ///
    /// Embeddings live in their own columns and are left out.
    pub fn payload(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("embeddings");
        }
        Ok(value)
    }

    /// Rebuild a record from a persisted payload plus its embedding columns.
    pub fn from_payload(payload: serde_json::Value, embeddings: EmbeddingVectors) -> Result<Self> {
        let mut record: ProcessedRecord = serde_json::from_value(payload)?;
        record.embeddings = embeddings;
        Ok(record)
    }
}

/// Where a record currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMarker {
    Primary,
    FallbackPending,
    Migrating,
}

impl TierMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierMarker::Primary => "primary",
            TierMarker::FallbackPending => "fallback_pending",
            TierMarker::Migrating => "migrating",
        }
    }
}

impl std::fmt::Display for TierMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a sync-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Migrating,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Migrating => "migrating",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SyncStatus::Pending),
            "migrating" => Some(SyncStatus::Migrating),
            _ => None,
        }
    }

    pub fn tier_marker(&self) -> TierMarker {
        match self {
            SyncStatus::Pending => TierMarker::FallbackPending,
            SyncStatus::Migrating => TierMarker::Migrating,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fallback-resident record waiting to be migrated to the primary tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub key: CanonicalKey,
    pub status: SyncStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl SyncQueueEntry {
    pub fn new(key: CanonicalKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: SyncStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            enqueued_at: now,
            last_error: None,
        }
    }
}

/// Sort order for record queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    RecentlyUpdated,
}

/// Filters for structured record queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub source_kind: Option<SourceKind>,
    /// Case-insensitive match against title or description.
    pub text: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: SortOrder,
    pub limit: usize,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            source_kind: None,
            text: None,
            created_after: None,
            created_before: None,
            sort: SortOrder::NewestFirst,
            limit: 10,
        }
    }
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate the filters against a record in memory.
    pub fn matches(&self, record: &ProcessedRecord) -> bool {
        if let Some(kind) = self.source_kind {
            if record.source_kind != kind {
                return false;
            }
        }
        if let Some(ref text) = self.text {
            let needle = text.to_lowercase();
            let title = record.enrichment.title.to_lowercase();
            let description = record.enrichment.description.to_lowercase();
            if !title.contains(&needle) && !description.contains(&needle) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at >= before {
                return false;
            }
        }
        true
    }

    /// Sort records in place according to `self.sort`.
    pub fn sort_records(&self, records: &mut [ProcessedRecord]) {
        match self.sort {
            SortOrder::NewestFirst => records.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::OldestFirst => records.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::RecentlyUpdated => {
                records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at))
            }
        }
    }
}

/// A record returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: ProcessedRecord,
    /// Cosine similarity (1.0 = identical direction).
    pub similarity: f32,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fallback_writes: u64,
    pub migrations: u64,
    pub migration_failures: u64,
    pub pending_sync: u64,
}

/// Counts describing the contents of one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub total_records: i64,
    pub records_by_kind: BTreeMap<String, i64>,
    pub with_embeddings: i64,
    pub pending_sync: i64,
    pub migrating: i64,
    pub oldest_pending: Option<DateTime<Utc>>,
}
