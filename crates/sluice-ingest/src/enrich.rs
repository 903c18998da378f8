//! Model-free enrichment from the extracted text itself.

use crate::error::{IngestError, IngestResult};
use crate::identity::SourceIdentity;
use crate::strategy::{Enricher, EnrichmentOutput, Extracted};
use async_trait::async_trait;
use sluice_core::Enrichment;

const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 300;

/// Derives title, description and summary from the leading text.
///
/// Stands in where no language model is configured. Produces no embeddings.
pub struct ExcerptEnricher {
    summary_sentences: usize,
}

impl ExcerptEnricher {
    pub fn new() -> Self {
        Self {
            summary_sentences: 3,
        }
    }

    pub fn with_summary_sentences(mut self, count: usize) -> Self {
        self.summary_sentences = count.max(1);
        self
    }
}

impl Default for ExcerptEnricher {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut at a char boundary, marking the cut with an ellipsis.
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
}

fn first_paragraph(text: &str) -> Option<String> {
    text.split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|p| !p.is_empty())
}

/// The first `count` sentences, whitespace collapsed.
fn leading_sentences(text: &str, count: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut seen = 0;
    for (idx, c) in flat.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = idx + c.len_utf8();
            let at_boundary = flat[end..].starts_with(' ') || end == flat.len();
            if at_boundary {
                seen += 1;
                if seen == count {
                    return flat[..end].to_string();
                }
            }
        }
    }
    flat
}

#[async_trait]
impl Enricher for ExcerptEnricher {
    async fn enrich(
        &self,
        source: &SourceIdentity,
        extracted: &Extracted,
    ) -> IngestResult<EnrichmentOutput> {
        let text = extracted.text.trim();
        if text.is_empty() {
            return Err(IngestError::enrichment(
                format!("{} has no text to describe", source.key),
                false,
            ));
        }

        let title = extracted
            .title_hint
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| first_line(text))
            .map(|t| clip(t.trim(), MAX_TITLE_CHARS))
            .unwrap_or_else(|| source.key.to_string());

        let description = first_paragraph(text)
            .map(|p| clip(&p, MAX_DESCRIPTION_CHARS))
            .unwrap_or_default();
        let summary = leading_sentences(text, self.summary_sentences);

        Ok(EnrichmentOutput::new(Enrichment::new(title, description, summary)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{CanonicalKey, SourceKind};

    fn source() -> SourceIdentity {
        SourceIdentity::new(
            SourceKind::Text,
            CanonicalKey::new("text", "txt/0011223344556677").unwrap(),
            "notes.txt",
        )
    }

    #[tokio::test]
    async fn test_fields_from_text() {
        let extracted = Extracted::new(
            "Release notes\n\nThe cache now survives restarts.\nIt also syncs.\n\nWe fixed bugs. \
             Many of them! Really? Yes.",
        );
        let out = ExcerptEnricher::new().enrich(&source(), &extracted).await.unwrap();

        assert_eq!(out.enrichment.title, "Release notes");
        assert_eq!(out.enrichment.description, "Release notes");
        assert_eq!(
            out.enrichment.summary,
            "Release notes The cache now survives restarts. It also syncs. We fixed bugs."
        );
        assert!(out.embeddings.is_none());
    }

    #[tokio::test]
    async fn test_title_hint_wins() {
        let extracted = Extracted::new("# Heading\n\nBody text.").with_title("From metadata");
        let out = ExcerptEnricher::new()
            .with_summary_sentences(1)
            .enrich(&source(), &extracted)
            .await
            .unwrap();
        assert_eq!(out.enrichment.title, "From metadata");
        assert_eq!(out.enrichment.description, "# Heading");
    }

    #[tokio::test]
    async fn test_empty_text_fails_permanently() {
        let err = ExcerptEnricher::new()
            .enrich(&source(), &Extracted::new("  \n "))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("héllo wörld", 5), "héllo...");
        assert_eq!(clip("short", 10), "short");
    }
}
