//! Database CRUD operations.

pub mod records;
pub mod stats;
pub mod sync_queue;
pub mod vectors;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 rendering so stored timestamps sort lexicographically.
pub(crate) fn ts_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
