//! Built-in extraction for local text sources.

mod markdown;
mod text;

use crate::error::{IngestError, IngestResult};
use crate::identity::SourceIdentity;
use crate::strategy::{Extracted, Extractor};
use async_trait::async_trait;
use sluice_core::SourceKind;
use tracing::debug;

/// Extracts plain text, code and markdown from files or in-memory payloads.
///
/// Remote kinds (videos, repositories, web pages) need their own extractor;
/// this one rejects them with a permanent error.
pub struct LocalTextExtractor {
    /// Whether fenced code blocks are kept in markdown output.
    preserve_code_blocks: bool,
}

impl LocalTextExtractor {
    pub fn new() -> Self {
        Self {
            preserve_code_blocks: true,
        }
    }

    pub fn without_code_blocks(mut self) -> Self {
        self.preserve_code_blocks = false;
        self
    }

    async fn read(&self, source: &SourceIdentity) -> IngestResult<Vec<u8>> {
        if let Some(payload) = &source.payload {
            return Ok(payload.to_vec());
        }
        let path = source
            .path
            .as_ref()
            .ok_or_else(|| IngestError::extraction(format!("{} has no local content", source.key), false))?;

        tokio::fs::read(path).await.map_err(|e| {
            // The file may reappear; a missing or locked file is worth retrying
            IngestError::extraction(format!("cannot read {}: {}", path.display(), e), true)
        })
    }
}

impl Default for LocalTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// File extension of a local source: from the path, else from the key.
fn extension(source: &SourceIdentity) -> String {
    source
        .path
        .as_ref()
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| {
            source
                .key
                .path()
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
}

/// Fallback title: the file name, when there is one.
fn file_title(source: &SourceIdentity) -> Option<String> {
    source
        .path
        .as_ref()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl Extractor for LocalTextExtractor {
    async fn extract(&self, source: &SourceIdentity) -> IngestResult<Extracted> {
        if !matches!(source.kind, SourceKind::Text | SourceKind::Obsidian) {
            return Err(IngestError::extraction(
                format!("no local extractor for {} sources", source.kind),
                false,
            ));
        }

        let bytes = self.read(source).await?;
        let content = String::from_utf8(bytes).map_err(|_| {
            IngestError::extraction(format!("{} is not valid UTF-8", source.key), false)
        })?;

        let ext = extension(source);
        debug!("Extracting {} as .{}", source.key, ext);

        let mut extracted = if markdown::is_markdown(&ext) {
            markdown::extract(&content, self.preserve_code_blocks)
        } else {
            text::extract(&content, &ext)
        };

        if extracted.title_hint.is_none() {
            extracted.title_hint = file_title(source);
        }
        if extracted.text.trim().is_empty() {
            return Err(IngestError::extraction(
                format!("{} has no text content", source.key),
                false,
            ));
        }

        Ok(extracted)
    }
}
