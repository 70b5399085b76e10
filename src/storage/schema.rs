//! Database schema definitions
//!
//! Listings and details are stored as JSON documents. The key columns are
//! copied out of the document so `find` can match on them, and
//! `UNIQUE(collection, key_parts)` backs the composite key invariant.
//! `key_parts` is the JSON array of normalised parts; `record_key` is only
//! the readable `a|b|c` form.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    report TEXT
);

-- Marketplace listings
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    record_key TEXT NOT NULL,
    key_parts TEXT NOT NULL,
    source TEXT NOT NULL,
    post_id TEXT,
    listing_id TEXT NOT NULL,
    document TEXT NOT NULL,
    inserted_at TEXT NOT NULL,
    UNIQUE(collection, key_parts)
);

CREATE INDEX IF NOT EXISTS idx_listings_lookup ON listings(collection, source, listing_id);

-- Per-listing time series
CREATE TABLE IF NOT EXISTS details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    record_key TEXT NOT NULL,
    key_parts TEXT NOT NULL,
    source TEXT NOT NULL,
    post_id TEXT,
    listing_id TEXT NOT NULL,
    document TEXT NOT NULL,
    inserted_at TEXT NOT NULL,
    UNIQUE(collection, key_parts)
);

CREATE INDEX IF NOT EXISTS idx_details_lookup ON details(collection, source, listing_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
