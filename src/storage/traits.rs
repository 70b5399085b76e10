//! Storage traits and error types
//!
//! The read and write sides of the store are separate traits: the crawler
//! only ever writes through [`RecordSink`], and only the dedup index load
//! reads keys through [`KeySource`].

use crate::output::CrawlReport;
use crate::state::CompositeKey;
use crate::storage::{CollectionStats, InsertOutcome, KeyFilter, Record, RecordKind, RunRecord, RunStatus};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Enumerates persisted keys
pub trait KeySource {
    /// Keys of every listing in `collection`
    fn listing_keys(&self, collection: &str) -> StorageResult<Vec<CompositeKey>>;

    /// Keys of every detail record in `collection`
    fn detail_keys(&self, collection: &str) -> StorageResult<Vec<CompositeKey>>;
}

/// Append-only record persistence
///
/// Implementations must be safe to call from concurrent tasks. The sink
/// never reads; a duplicate key is reported as [`InsertOutcome::Duplicate`]
/// rather than as an error.
pub trait RecordSink: Send + Sync {
    fn insert(&self, collection: &str, record: &Record) -> StorageResult<InsertOutcome>;
}

/// Run bookkeeping and read-side queries
pub trait Storage: KeySource + RecordSink {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Stamps the finish time, final status and counters of a run
    fn finish_run(&self, run_id: i64, status: RunStatus, report: &CrawlReport)
        -> StorageResult<()>;

    // ===== Queries =====

    /// Stored documents of one kind matching `filter`, oldest first
    fn find(
        &self,
        kind: RecordKind,
        collection: &str,
        filter: &KeyFilter,
    ) -> StorageResult<Vec<Value>>;

    /// Number of records in a collection
    fn count_records(&self, kind: RecordKind, collection: &str) -> StorageResult<u64>;

    /// Record counts for every collection holding data
    fn collection_stats(&self) -> StorageResult<Vec<CollectionStats>>;
}
