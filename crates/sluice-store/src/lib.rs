//! Sluice Store - the storage tiers behind the ingestion pipeline.
//!
//! [`TieredStore`] unifies a primary tier (PostgreSQL, or SQLite for
//! embedded deployments) with an always-available SQLite fallback. The
//! [`Reconciler`] drains fallback-resident records into the primary once it
//! is reachable again.

mod error;
mod postgres;
mod reconciler;
mod sqlite;
mod telemetry;
mod tier;
mod tiered;

#[cfg(test)]
mod testing;

pub use error::{StoreError, StoreResult, SyncError, TierError, TierResult};
pub use postgres::PgTier;
pub use reconciler::{ReconcileReport, Reconciler};
pub use sqlite::SqliteTier;
pub use telemetry::{describe_metrics, Telemetry};
pub use tier::PrimaryTier;
pub use tiered::{MigrationOutcome, TieredStore};
