//! Database statistics operations.

use super::ts_from_sql;
use crate::database::Database;
use crate::error::DbResult;
use sluice_core::DatabaseStats;
use std::collections::BTreeMap;

impl Database {
    /// Get record and sync-queue statistics.
    pub fn get_stats(&self) -> DbResult<DatabaseStats> {
        let conn = self.conn()?;

        let total_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

        // Records by kind
        let mut records_by_kind = BTreeMap::new();
        {
            let mut stmt =
                conn.prepare("SELECT source_kind, COUNT(*) FROM records GROUP BY source_kind")?;
            let rows = stmt.query_map([], |row| {
                let kind: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((kind, count))
            })?;
            for row in rows {
                let (kind, count) = row?;
                records_by_kind.insert(kind, count);
            }
        }

        let with_embeddings: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records
             WHERE description_embedding IS NOT NULL OR summary_embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let pending_sync: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let migrating: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'migrating'",
            [],
            |row| row.get(0),
        )?;

        let oldest: Option<String> =
            conn.query_row("SELECT MIN(enqueued_at) FROM sync_queue", [], |row| row.get(0))?;
        let oldest_pending = oldest.map(|raw| ts_from_sql(0, &raw)).transpose()?;

        Ok(DatabaseStats {
            total_records,
            records_by_kind,
            with_embeddings,
            pending_sync,
            migrating,
            oldest_pending,
        })
    }
}
