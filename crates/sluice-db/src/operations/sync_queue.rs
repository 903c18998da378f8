//! Sync queue operations.
//!
//! Every record written while the primary tier is unreachable gets a queue
//! entry in the same transaction. The reconciler drains the queue in
//! `enqueued_at` order.

use super::records::{self, WriteMode};
use super::{ts_from_sql, ts_to_sql};
use crate::database::Database;
use crate::error::DbResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use sluice_core::{CanonicalKey, ProcessedRecord, SyncQueueEntry, SyncStatus};
use tracing::debug;

/// What happened to the local copy after a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The local copy and its queue entry were removed.
    Removed,
    /// The local copy changed while migrating; it stays queued.
    Requeued,
}

const ENTRY_COLUMNS: &str =
    "uri_key, status, attempts, next_attempt_at, enqueued_at, last_error";

fn row_to_entry(row: &Row) -> rusqlite::Result<SyncQueueEntry> {
    let raw_key: String = row.get(0)?;
    let key = CanonicalKey::parse(&raw_key).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: String = row.get(1)?;
    let attempts: i64 = row.get(2)?;
    let next_attempt_at: String = row.get(3)?;
    let enqueued_at: String = row.get(4)?;

    Ok(SyncQueueEntry {
        key,
        status: SyncStatus::from_str(&status).unwrap_or_default(),
        attempts: attempts.max(0) as u32,
        next_attempt_at: ts_from_sql(3, &next_attempt_at)?,
        enqueued_at: ts_from_sql(4, &enqueued_at)?,
        last_error: row.get(5)?,
    })
}

impl Database {
    /// Write a record and enqueue it for migration atomically.
    ///
    /// Re-writing a queued key keeps its original position in the queue and
    /// makes it eligible immediately.
    pub fn write_pending(
        &self,
        record: &ProcessedRecord,
        mode: WriteMode,
    ) -> DbResult<ProcessedRecord> {
        let mut conn = self.conn()?;
        let tx = records::begin_write(&mut conn)?;

        let stored = records::write_record(&tx, record, mode)?;
        let now = ts_to_sql(&Utc::now());
        tx.execute(
            r#"
            INSERT INTO sync_queue (uri_key, status, attempts, next_attempt_at, enqueued_at)
            VALUES (?1, 'pending', 0, ?2, ?2)
            ON CONFLICT(uri_key) DO UPDATE SET
                status = 'pending',
                next_attempt_at = excluded.next_attempt_at,
                last_error = NULL
            "#,
            params![stored.key.as_str(), now],
        )?;

        tx.commit()?;
        debug!("Queued {} for migration", stored.key);
        Ok(stored)
    }

    /// Pending entries whose backoff has elapsed, oldest first.
    pub fn next_eligible(&self, now: DateTime<Utc>, limit: usize) -> DbResult<Vec<SyncQueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_queue
             WHERE status = 'pending' AND next_attempt_at <= ?1
             ORDER BY enqueued_at ASC, uri_key ASC
             LIMIT ?2",
            ENTRY_COLUMNS
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map(params![ts_to_sql(&now), limit], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// All queue entries, oldest first.
    pub fn list_sync_queue(&self) -> DbResult<Vec<SyncQueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_queue ORDER BY enqueued_at ASC, uri_key ASC",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Queue entry for a key, if one exists.
    pub fn sync_entry(&self, key: &CanonicalKey) -> DbResult<Option<SyncQueueEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM sync_queue WHERE uri_key = ?1", ENTRY_COLUMNS),
                params![key.as_str()],
                row_to_entry,
            )
            .optional()?;

        Ok(entry)
    }

    /// Claim a pending entry for migration. Returns false if it was not pending.
    pub fn mark_migrating(&self, key: &CanonicalKey) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'migrating' WHERE uri_key = ?1 AND status = 'pending'",
            params![key.as_str()],
        )?;
        Ok(rows == 1)
    }

    /// Finish a successful migration of the version stamped `migrated_updated_at`.
    ///
    /// If the local record was rewritten in the meantime it stays, and its
    /// entry goes back to pending so the newer version migrates too.
    pub fn complete_migration(
        &self,
        key: &CanonicalKey,
        migrated_updated_at: &DateTime<Utc>,
    ) -> DbResult<CleanupOutcome> {
        let mut conn = self.conn()?;
        let tx = records::begin_write(&mut conn)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT updated_at FROM records WHERE uri_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match current {
            Some(ref stamp) if *stamp != ts_to_sql(migrated_updated_at) => {
                tx.execute(
                    "UPDATE sync_queue
                     SET status = 'pending', attempts = 0, next_attempt_at = ?2, last_error = NULL
                     WHERE uri_key = ?1",
                    params![key.as_str(), ts_to_sql(&Utc::now())],
                )?;
                CleanupOutcome::Requeued
            }
            Some(_) => {
                tx.execute("DELETE FROM records WHERE uri_key = ?1", params![key.as_str()])?;
                tx.execute("DELETE FROM sync_queue WHERE uri_key = ?1", params![key.as_str()])?;
                CleanupOutcome::Removed
            }
            None => {
                tx.execute("DELETE FROM sync_queue WHERE uri_key = ?1", params![key.as_str()])?;
                CleanupOutcome::Removed
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Return an entry to pending after a failed attempt.
    pub fn reschedule(
        &self,
        key: &CanonicalKey,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_queue
             SET status = 'pending', attempts = ?2, next_attempt_at = ?3, last_error = ?4
             WHERE uri_key = ?1",
            params![key.as_str(), attempts as i64, ts_to_sql(&next_attempt_at), error],
        )?;
        Ok(())
    }

    /// Reset entries left `migrating` by an interrupted run.
    pub fn reset_migrating(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'migrating'",
            [],
        )?;
        Ok(rows)
    }

    /// Number of entries in the queue, in any status.
    pub fn pending_sync_count(&self) -> DbResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
