//! Statistics read back from the store
//!
//! This module provides the `--stats` view: how many records each collection
//! holds and how the most recent run ended.

use crate::storage::{CollectionStats, RecordKind, RunRecord, Storage};
use crate::FlipwatchError;

/// Store contents summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Record counts per collection, listings first
    pub collections: Vec<CollectionStats>,

    /// The most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

impl StoreStatistics {
    /// Total records of one kind across all collections
    pub fn total(&self, kind: RecordKind) -> u64 {
        self.collections
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.records)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(FlipwatchError)` - Failed to query statistics
pub fn load_store_statistics(storage: &dyn Storage) -> Result<StoreStatistics, FlipwatchError> {
    Ok(StoreStatistics {
        collections: storage.collection_stats()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_store_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Listings: {}", stats.total(RecordKind::Listing));
    println!("  Detail records: {}", stats.total(RecordKind::Detail));
    println!();

    if !stats.collections.is_empty() {
        println!("Collections:");
        for collection in &stats.collections {
            println!(
                "  {} ({}): {}",
                collection.collection, collection.kind, collection.records
            );
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Run ID: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Config hash: {}", run.config_hash);
            if let Some(report) = &run.report {
                println!("{}", report);
            }
        }
        None => println!("No crawl runs recorded yet."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CrawlReport;
    use crate::sites::SiteKind;
    use crate::storage::{Listing, Record, RecordSink, RunStatus, SqliteStorage};

    #[test]
    fn test_empty_store() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_store_statistics(&storage).unwrap();

        assert!(stats.collections.is_empty());
        assert!(stats.latest_run.is_none());
        assert_eq!(stats.total(RecordKind::Listing), 0);
    }

    #[test]
    fn test_counts_and_latest_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        for id in ["1", "2"] {
            let listing = Listing::new(SiteKind::Fei, id, id, "https://example.com/");
            storage.insert("fei_listings", &Record::Listing(listing)).unwrap();
        }
        let listing = Listing::new(SiteKind::Flippa, "9", "9", "https://example.com/");
        storage
            .insert("flippa_listings", &Record::Listing(listing))
            .unwrap();

        let run_id = storage.create_run("hash").unwrap();
        let report = CrawlReport {
            listings_persisted: 3,
            ..CrawlReport::default()
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &report)
            .unwrap();

        let stats = load_store_statistics(&storage).unwrap();
        assert_eq!(stats.collections.len(), 2);
        assert_eq!(stats.total(RecordKind::Listing), 3);
        assert_eq!(stats.total(RecordKind::Detail), 0);

        let run = stats.latest_run.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.report, Some(report));
    }
}
