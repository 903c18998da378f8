//! Record CRUD operations.

use super::{ts_from_sql, ts_to_sql};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::operations::vectors::{blob_to_vector, vector_to_blob};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use sluice_core::{CanonicalKey, EmbeddingVectors, ProcessedRecord, RecordQuery, SortOrder};
use tracing::debug;

pub(crate) const RECORD_COLUMNS: &str =
    "data, description_embedding, summary_embedding, embed_model";

/// How a write treats an existing row for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with [`DbError::Conflict`] if the key is present.
    InsertOnly,
    /// Replace content, keep the original `created_at`, bump `updated_at`.
    Upsert,
    /// Store the record exactly as given, timestamps included.
    Replace,
}

pub(crate) type RawRecord = (String, Option<Vec<u8>>, Option<Vec<u8>>, Option<String>);

pub(crate) fn read_raw(row: &Row) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub(crate) fn decode(raw: RawRecord) -> DbResult<ProcessedRecord> {
    let (data, description, summary, model) = raw;
    let payload: serde_json::Value = serde_json::from_str(&data)?;
    let embeddings = EmbeddingVectors {
        description: description.as_deref().map(blob_to_vector),
        summary: summary.as_deref().map(blob_to_vector),
        model,
    };
    Ok(ProcessedRecord::from_payload(payload, embeddings)?)
}

fn map_conflict(err: rusqlite::Error, key: &CanonicalKey) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DbError::Conflict(key.to_string())
        }
        other => DbError::from(other),
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

const INSERT_RECORD: &str = r#"
    INSERT INTO records (uri_key, source_kind, title, description, data,
                         description_embedding, summary_embedding, embed_model,
                         created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

const ON_KEY_CONFLICT: &str = r#"
    ON CONFLICT(uri_key) DO UPDATE SET
        source_kind = excluded.source_kind,
        title = excluded.title,
        description = excluded.description,
        data = excluded.data,
        description_embedding = excluded.description_embedding,
        summary_embedding = excluded.summary_embedding,
        embed_model = excluded.embed_model,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at
"#;

/// Open a write transaction that takes the write lock up front, so reads
/// inside it cannot go stale before the write lands.
pub(crate) fn begin_write(conn: &mut Connection) -> DbResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Write a record on an existing connection or transaction.
///
/// `InsertOnly` is a single statement guarded by the unique index on
/// `uri_key`. `Upsert` reads the existing timestamps first, so callers must
/// run it inside [`begin_write`].
///
/// Returns the record as stored, with timestamps adjusted per `mode`.
pub(crate) fn write_record(
    conn: &Connection,
    record: &ProcessedRecord,
    mode: WriteMode,
) -> DbResult<ProcessedRecord> {
    let key = record.key.as_str();
    let mut stored = record.clone();

    if mode == WriteMode::Upsert {
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT created_at, updated_at FROM records WHERE uri_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((created_at, updated_at)) = existing {
            stored.rebase_on(ts_from_sql(0, &created_at)?, ts_from_sql(1, &updated_at)?);
        }
    }

    let data = stored.payload()?.to_string();
    let description = stored.embeddings.description.as_deref().map(vector_to_blob);
    let summary = stored.embeddings.summary.as_deref().map(vector_to_blob);

    let sql = match mode {
        WriteMode::InsertOnly => INSERT_RECORD.to_string(),
        WriteMode::Upsert | WriteMode::Replace => format!("{}{}", INSERT_RECORD, ON_KEY_CONFLICT),
    };
    conn.execute(
        &sql,
        params![
            key,
            stored.source_kind.as_str(),
            stored.enrichment.title,
            stored.enrichment.description,
            data,
            description,
            summary,
            stored.embeddings.model,
            ts_to_sql(&stored.created_at),
            ts_to_sql(&stored.updated_at),
        ],
    )
    .map_err(|e| map_conflict(e, &stored.key))?;

    debug!("Stored record {} ({:?})", key, mode);
    Ok(stored)
}

pub(crate) fn read_record(conn: &Connection, key: &CanonicalKey) -> DbResult<Option<ProcessedRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM records WHERE uri_key = ?1", RECORD_COLUMNS),
            params![key.as_str()],
            read_raw,
        )
        .optional()?;

    raw.map(decode).transpose()
}

impl Database {
    /// Insert a record; fails with [`DbError::Conflict`] if the key exists.
    pub fn insert_record(&self, record: &ProcessedRecord) -> DbResult<ProcessedRecord> {
        let conn = self.conn()?;
        write_record(&conn, record, WriteMode::InsertOnly)
    }

    /// Write a record with an explicit conflict policy.
    pub fn write_record(&self, record: &ProcessedRecord, mode: WriteMode) -> DbResult<ProcessedRecord> {
        let mut conn = self.conn()?;
        let tx = begin_write(&mut conn)?;
        let stored = write_record(&tx, record, mode)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Store a record exactly as given unless this store already holds the
    /// same or a newer version. Returns whether the record was written.
    pub fn write_if_newer(&self, record: &ProcessedRecord) -> DbResult<bool> {
        let mut conn = self.conn()?;
        let tx = begin_write(&mut conn)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT updated_at FROM records WHERE uri_key = ?1",
                params![record.key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(raw) = existing {
            if ts_from_sql(0, &raw)? >= record.updated_at {
                return Ok(false);
            }
        }

        write_record(&tx, record, WriteMode::Replace)?;
        tx.commit()?;
        Ok(true)
    }

    /// Get a record by key.
    pub fn get_record(&self, key: &CanonicalKey) -> DbResult<Option<ProcessedRecord>> {
        let conn = self.conn()?;
        read_record(&conn, key)
    }

    /// Check whether a record exists without decoding it.
    pub fn record_exists(&self, key: &CanonicalKey) -> DbResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE uri_key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete a record (and any sync-queue entry) by key.
    pub fn delete_record(&self, key: &CanonicalKey) -> DbResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM records WHERE uri_key = ?1", params![key.as_str()])?;

        if rows == 0 {
            return Err(DbError::NotFound(format!("Record not found: {}", key)));
        }

        Ok(())
    }

    /// Structured query over records.
    pub fn query_records(&self, query: &RecordQuery) -> DbResult<Vec<ProcessedRecord>> {
        let conn = self.conn()?;

        let mut sql = format!("SELECT {} FROM records WHERE 1 = 1", RECORD_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(kind) = query.source_kind {
            args.push(Box::new(kind.as_str().to_string()));
            sql.push_str(&format!(" AND source_kind = ?{}", args.len()));
        }
        if let Some(ref text) = query.text {
            args.push(Box::new(format!("%{}%", escape_like(&text.to_lowercase()))));
            let n = args.len();
            sql.push_str(&format!(
                " AND (lower(title) LIKE ?{n} ESCAPE '\\' OR lower(description) LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(after) = query.created_after {
            args.push(Box::new(ts_to_sql(&after)));
            sql.push_str(&format!(" AND created_at > ?{}", args.len()));
        }
        if let Some(before) = query.created_before {
            args.push(Box::new(ts_to_sql(&before)));
            sql.push_str(&format!(" AND created_at < ?{}", args.len()));
        }

        sql.push_str(match query.sort {
            SortOrder::NewestFirst => " ORDER BY created_at DESC, id DESC",
            SortOrder::OldestFirst => " ORDER BY created_at ASC, id ASC",
            SortOrder::RecentlyUpdated => " ORDER BY updated_at DESC, id DESC",
        });

        args.push(Box::new(i64::try_from(query.limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), read_raw)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode).collect()
    }

    /// The most recently created record, if any.
    pub fn last_record(&self) -> DbResult<Option<ProcessedRecord>> {
        let records = self.query_records(&RecordQuery::new().with_limit(1))?;
        Ok(records.into_iter().next())
    }

    /// Batch check which of `keys` exist here.
    pub fn existing_keys(&self, keys: &[CanonicalKey]) -> DbResult<Vec<CanonicalKey>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = (1..=keys.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT uri_key FROM records WHERE uri_key IN ({})",
            placeholders
        ))?;

        let found = stmt
            .query_map(
                rusqlite::params_from_iter(keys.iter().map(|k| k.as_str())),
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(keys
            .iter()
            .filter(|k| found.iter().any(|f| f == k.as_str()))
            .cloned()
            .collect())
    }
}
