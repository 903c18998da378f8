//! Error types for the ingestion pipeline.

use crate::pipeline::PipelineStage;
use sluice_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for identity resolution.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Failures to turn raw input into a canonical key. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("No registered scheme matches: {0}")]
    NoMatchingScheme(String),

    #[error("Malformed {scheme} source '{input}': {reason}")]
    Malformed {
        scheme: &'static str,
        input: String,
        reason: String,
    },

    #[error("Cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

impl IdentityError {
    pub fn malformed(scheme: &'static str, input: &str, reason: impl ToString) -> Self {
        IdentityError::Malformed {
            scheme,
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by [`crate::Orchestrator::process`].
///
/// `Clone` so one outcome can be handed to every caller waiting on the same
/// key.
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Extraction failed: {message}")]
    Extraction { message: String, retryable: bool },

    #[error("Enrichment failed: {message}")]
    Enrichment { message: String, retryable: bool },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: PipelineStage, after: Duration },

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl IngestError {
    pub fn extraction(message: impl Into<String>, retryable: bool) -> Self {
        IngestError::Extraction {
            message: message.into(),
            retryable,
        }
    }

    pub fn enrichment(message: impl Into<String>, retryable: bool) -> Self {
        IngestError::Enrichment {
            message: message.into(),
            retryable,
        }
    }

    /// Whether calling `process` again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Identity(_) | IngestError::Persistence(_) => false,
            IngestError::Extraction { retryable, .. } | IngestError::Enrichment { retryable, .. } => {
                *retryable
            }
            IngestError::Timeout { .. } => true,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Persistence(err.to_string())
    }
}
