//! Vector search over record embeddings.

use super::records::{decode, RawRecord, RECORD_COLUMNS};
use crate::database::Database;
use crate::error::DbResult;
use sluice_core::{EmbeddingField, ScoredRecord, SourceKind};
use std::cmp::Ordering;

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}

/// Encode a vector as little-endian `f32` bytes.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes; a trailing partial value is dropped.
pub fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl Database {
    /// Find records whose `field` embedding is closest to `query_vector`.
    ///
    /// Brute-force scan; records without the embedding are skipped.
    pub fn similar_records(
        &self,
        query_vector: &[f32],
        field: EmbeddingField,
        limit: usize,
        kind: Option<SourceKind>,
    ) -> DbResult<Vec<ScoredRecord>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM records WHERE {} IS NOT NULL",
            RECORD_COLUMNS,
            field.column()
        );
        if kind.is_some() {
            sql.push_str(" AND source_kind = ?1");
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<RawRecord> = match kind {
            Some(kind) => stmt
                .query_map([kind.as_str()], super::records::read_raw)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map([], super::records::read_raw)?
                .collect::<Result<_, _>>()?,
        };

        let mut results = Vec::with_capacity(rows.len());
        for raw in rows {
            let record = decode(raw)?;
            let similarity = match record.embeddings.get(field) {
                Some(vector) => cosine_similarity(query_vector, vector),
                None => continue,
            };
            results.push(ScoredRecord { record, similarity });
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }
}
