//! Store error types.

use sluice_db::DbError;
use thiserror::Error;

/// Errors reported by a primary tier.
#[derive(Error, Debug)]
pub enum TierError {
    /// Connectivity failure; callers fall through to the fallback store.
    #[error("Primary tier unavailable: {0}")]
    Unavailable(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Primary tier error: {0}")]
    Backend(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl TierError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TierError::Unavailable(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TierError::Conflict(_))
    }
}

impl From<DbError> for TierError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(key) => TierError::Conflict(key),
            DbError::Pool(e) => TierError::Unavailable(e.to_string()),
            DbError::Serialization(e) => TierError::Corrupt(e.to_string()),
            DbError::Core(e) => TierError::Corrupt(e.to_string()),
            other => TierError::Backend(other.to_string()),
        }
    }
}

pub type TierResult<T> = Result<T, TierError>;

/// Errors surfaced by [`crate::TieredStore`] to request callers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Neither tier accepted the write.
    #[error("Could not persist {key}: primary: {primary}; fallback: {fallback}")]
    Persistence {
        key: String,
        primary: String,
        fallback: String,
    },

    #[error("Fallback store error: {0}")]
    Fallback(#[from] DbError),

    #[error("Primary store error: {0}")]
    Primary(#[from] TierError),

    #[error("Embedding dimension mismatch: {0}")]
    DimensionMismatch(sluice_core::Error),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A failed migration attempt. Logged and counted, never surfaced to
/// request callers.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Primary tier unreachable: {0}")]
    PrimaryUnavailable(String),

    #[error("Primary tier rejected record: {0}")]
    Primary(TierError),

    #[error("Fallback store error: {0}")]
    Fallback(#[from] DbError),
}

impl From<TierError> for SyncError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::Unavailable(msg) => SyncError::PrimaryUnavailable(msg),
            other => SyncError::Primary(other),
        }
    }
}

impl SyncError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SyncError::PrimaryUnavailable(_))
    }
}
