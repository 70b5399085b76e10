//! Storage module for persisting crawled records
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Append-only listing and detail record insertion
//! - Key enumeration for building the dedup index
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{KeySource, RecordSink, Storage, StorageError, StorageResult};

use crate::composite_key;
use crate::output::CrawlReport;
use crate::sites::SiteKind;
use crate::state::CompositeKey;
use crate::FlipwatchError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Opens (creating if needed) the SQLite store at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, FlipwatchError> {
    SqliteStorage::new(path)
}

/// Record namespaces; each has its own key space and table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Listing,
    Detail,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Listing => "listings",
            Self::Detail => "details",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collections one site writes its records to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkBinding {
    pub listings_collection: String,
    pub details_collection: String,
}

impl SinkBinding {
    pub fn collection(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Listing => &self.listings_collection,
            RecordKind::Detail => &self.details_collection,
        }
    }
}

/// One marketplace offering
///
/// Scalars a page does not expose are `None` and are stored as null; a
/// listing is never dropped for missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub source: SiteKind,
    pub post_id: String,
    pub listing_id: String,
    pub url: String,
    pub title: Option<String>,
    pub asking_price: Option<String>,
    pub yearly_revenue: Option<String>,
    pub yearly_profit: Option<String>,
    pub site_age: Option<String>,
    pub platform: Option<String>,
    pub site_type: Option<String>,

    /// Named sub-tables (traffic, financials, ...), each a list of row objects
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tables: Map<String, Value>,

    /// Every other attribute the page exposed
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Listing {
    /// A listing with identity fields set and everything else empty
    pub fn new(source: SiteKind, post_id: &str, listing_id: &str, url: &str) -> Self {
        Self {
            source,
            post_id: post_id.trim().to_string(),
            listing_id: listing_id.trim().to_string(),
            url: url.to_string(),
            title: None,
            asking_price: None,
            yearly_revenue: None,
            yearly_profit: None,
            site_age: None,
            platform: None,
            site_type: None,
            tables: Map::new(),
            attributes: Map::new(),
        }
    }

    /// `(source, post_id, listing_id)`
    pub fn key(&self) -> CompositeKey {
        composite_key!(self.source.as_str(), &self.post_id, &self.listing_id)
    }
}

/// Time series for one listing, aligned on the `Dates` axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub source: SiteKind,
    pub listing_id: String,
    pub url: String,
    pub series: BTreeMap<String, Vec<String>>,
}

impl DetailRecord {
    /// `(source, listing_id)`
    pub fn key(&self) -> CompositeKey {
        detail_key(self.source, &self.listing_id)
    }
}

/// Key of the detail record belonging to a listing id
pub fn detail_key(source: SiteKind, listing_id: &str) -> CompositeKey {
    composite_key!(source.as_str(), listing_id)
}

/// Anything the sink can persist
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Listing(Listing),
    Detail(DetailRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Listing(_) => RecordKind::Listing,
            Self::Detail(_) => RecordKind::Detail,
        }
    }

    pub fn key(&self) -> CompositeKey {
        match self {
            Self::Listing(l) => l.key(),
            Self::Detail(d) => d.key(),
        }
    }

    pub fn source(&self) -> SiteKind {
        match self {
            Self::Listing(l) => l.source,
            Self::Detail(d) => d.source,
        }
    }

    /// Columns the store indexes for exact-match lookups
    pub(crate) fn lookup_fields(&self) -> (Option<&str>, &str) {
        match self {
            Self::Listing(l) => (Some(&l.post_id), &l.listing_id),
            Self::Detail(d) => (None, &d.listing_id),
        }
    }

    /// The JSON document written to the store
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Listing(l) => serde_json::to_value(l),
            Self::Detail(d) => serde_json::to_value(d),
        }
    }
}

/// Result of a single insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The store already held a record with the same key
    Duplicate,
}

/// Exact-match filter over a collection's key columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    pub source: Option<SiteKind>,
    pub post_id: Option<String>,
    pub listing_id: Option<String>,
}

impl KeyFilter {
    pub fn source(source: SiteKind) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn listing_id(mut self, listing_id: &str) -> Self {
        self.listing_id = Some(listing_id.to_string());
        self
    }

    pub fn post_id(mut self, post_id: &str) -> Self {
        self.post_id = Some(post_id.to_string());
        self
    }
}

/// Stored record count for one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub kind: RecordKind,
    pub collection: String,
    pub records: u64,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    /// Counters recorded when the run finished
    pub report: Option<CrawlReport>,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
