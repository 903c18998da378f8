//! Sluice DB - embedded SQLite store holding records and the sync queue.
//!
//! Serves as the always-available fallback tier, and as a primary tier for
//! single-machine deployments.

mod database;
mod error;
mod migrations;
mod operations;

pub use database::Database;
pub use error::{DbError, DbResult};
pub use operations::records::WriteMode;
pub use operations::sync_queue::CleanupOutcome;
pub use operations::vectors::{blob_to_vector, cosine_similarity, vector_to_blob};
