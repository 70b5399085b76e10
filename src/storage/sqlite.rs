//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.
//! The connection sits behind a mutex so one `SqliteStorage` can be shared by
//! concurrent detail tasks through an `Arc`.

use crate::output::CrawlReport;
use crate::state::{CompositeKey, KeyPart};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{KeySource, RecordSink, Storage, StorageError, StorageResult};
use crate::storage::{
    CollectionStats, InsertOutcome, KeyFilter, Record, RecordKind, RunRecord, RunStatus,
};
use crate::FlipwatchError;
use chrono::Utc;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(FlipwatchError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, FlipwatchError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, FlipwatchError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn keys(&self, kind: RecordKind, collection: &str) -> StorageResult<Vec<CompositeKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT key_parts FROM {} WHERE collection = ?1 ORDER BY id",
            kind.table()
        ))?;

        let raw = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|parts| -> StorageResult<CompositeKey> {
                let parts: Vec<String> = serde_json::from_str(parts)?;
                Ok(CompositeKey::new(parts))
            })
            .collect()
    }
}

/// Only a UNIQUE clash means the key is already stored; other constraint
/// failures are real errors.
fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let report: Option<String> = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        report: report.and_then(|r| serde_json::from_str(&r).ok()),
    })
}

impl KeySource for SqliteStorage {
    fn listing_keys(&self, collection: &str) -> StorageResult<Vec<CompositeKey>> {
        self.keys(RecordKind::Listing, collection)
    }

    fn detail_keys(&self, collection: &str) -> StorageResult<Vec<CompositeKey>> {
        self.keys(RecordKind::Detail, collection)
    }
}

impl RecordSink for SqliteStorage {
    fn insert(&self, collection: &str, record: &Record) -> StorageResult<InsertOutcome> {
        let key = record.key();
        let parts: Vec<&str> = key.parts().iter().map(KeyPart::as_str).collect();
        let key_parts = serde_json::to_string(&parts)?;
        let document = serde_json::to_string(&record.to_document()?)?;
        let (post_id, listing_id) = record.lookup_fields();
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO {} (collection, record_key, key_parts, source, post_id, listing_id, document, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                record.kind().table()
            ),
            params![
                collection,
                key.to_string(),
                key_parts,
                record.source().as_str(),
                post_id,
                listing_id,
                document,
                now
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, report FROM runs WHERE id = ?1",
        )?;

        let run = stmt
            .query_row(params![run_id], run_from_row)
            .map_err(|_| StorageError::RunNotFound(run_id))?;

        Ok(run)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, report FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt.query_row([], run_from_row).optional()?;

        Ok(run)
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        report: &CrawlReport,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let report = serde_json::to_string(report)?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, report = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, report, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Queries =====

    fn find(
        &self,
        kind: RecordKind,
        collection: &str,
        filter: &KeyFilter,
    ) -> StorageResult<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT document FROM {} WHERE collection = ?1
             AND (?2 IS NULL OR source = ?2)
             AND (?3 IS NULL OR post_id = ?3)
             AND (?4 IS NULL OR listing_id = ?4)
             ORDER BY id",
            kind.table()
        ))?;

        let raw = stmt
            .query_map(
                params![
                    collection,
                    filter.source.map(|s| s.as_str()),
                    filter.post_id.as_deref(),
                    filter.listing_id.as_deref()
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }

    fn count_records(&self, kind: RecordKind, collection: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE collection = ?1",
                kind.table()
            ),
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn collection_stats(&self) -> StorageResult<Vec<CollectionStats>> {
        let conn = self.lock()?;
        let mut stats = Vec::new();

        for kind in [RecordKind::Listing, RecordKind::Detail] {
            let mut stmt = conn.prepare(&format!(
                "SELECT collection, COUNT(*) FROM {} GROUP BY collection ORDER BY collection",
                kind.table()
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(CollectionStats {
                    kind,
                    collection: row.get(0)?,
                    records: row.get::<_, i64>(1)? as u64,
                })
            })?;
            for row in rows {
                stats.push(row?);
            }
        }

        Ok(stats)
    }
}
