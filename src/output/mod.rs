//! Output module for crawl reports and store statistics
//!
//! This module handles:
//! - Counting what a crawl run did, per site and in total
//! - Printing run reports at the end of a crawl
//! - Reading back and printing what the store holds

pub mod stats;

pub use stats::{load_store_statistics, print_store_statistics, StoreStatistics};

use crate::sites::SiteKind;
use crate::storage::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for one crawl of one or more sites
///
/// Per-item failures end up here rather than in an error; the run itself
/// only fails when the store or configuration is unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Index pages fetched and parsed
    pub index_pages: u64,
    /// Index pages that could not be fetched or parsed
    pub index_failures: u64,
    /// Listing candidates read from index pages
    pub listings_found: u64,
    /// Listings written to the store
    pub listings_persisted: u64,
    /// Listings already known, either before or during the run
    pub listings_skipped: u64,
    /// Candidates dropped for lack of an identity, or refused by the store
    pub listings_rejected: u64,
    /// Detail pages fetched, parsed and written
    pub details_fetched: u64,
    /// Detail pages abandoned after a fetch, extraction or store failure
    pub details_failed: u64,
    /// Detail pages not followed because their record is already known
    pub details_skipped: u64,
    /// The run was cancelled before its frontier was exhausted
    pub cancelled: bool,
}

impl CrawlReport {
    /// Adds another report's counters into this one
    pub fn merge(&mut self, other: &CrawlReport) {
        self.index_pages += other.index_pages;
        self.index_failures += other.index_failures;
        self.listings_found += other.listings_found;
        self.listings_persisted += other.listings_persisted;
        self.listings_skipped += other.listings_skipped;
        self.listings_rejected += other.listings_rejected;
        self.details_fetched += other.details_fetched;
        self.details_failed += other.details_failed;
        self.details_skipped += other.details_skipped;
        self.cancelled |= other.cancelled;
    }

    /// Records written by the run
    pub fn records_written(&self) -> u64 {
        self.listings_persisted + self.details_fetched
    }

    /// Whether any page or item was abandoned
    pub fn has_failures(&self) -> bool {
        self.index_failures > 0 || self.details_failed > 0 || self.listings_rejected > 0
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  Index pages: {} fetched, {} failed",
            self.index_pages, self.index_failures
        )?;
        writeln!(
            f,
            "  Listings: {} found, {} persisted, {} skipped, {} rejected",
            self.listings_found, self.listings_persisted, self.listings_skipped, self.listings_rejected
        )?;
        write!(
            f,
            "  Details: {} fetched, {} failed, {} skipped",
            self.details_fetched, self.details_failed, self.details_skipped
        )
    }
}

/// Counters for one site within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReport {
    pub kind: SiteKind,
    pub report: CrawlReport,
}

/// Outcome of a whole crawl run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    /// Counters summed across every site
    pub fn total(&self) -> CrawlReport {
        let mut total = CrawlReport::default();
        for site in &self.sites {
            total.merge(&site.report);
        }
        total
    }

    /// Report for one site, if it was crawled
    pub fn site(&self, kind: SiteKind) -> Option<&CrawlReport> {
        self.sites.iter().find(|s| s.kind == kind).map(|s| &s.report)
    }
}

/// Prints a run report to stdout
pub fn print_run_report(report: &RunReport) {
    println!("=== Crawl Run {} ({}) ===\n", report.run_id, report.status.to_db_string());

    for site in &report.sites {
        println!("{}:", site.kind);
        println!("{}", site.report);
        if site.report.cancelled {
            println!("  (cancelled)");
        }
        println!();
    }

    let total = report.total();
    if report.sites.len() > 1 {
        println!("Total:");
        println!("{}", total);
        println!();
    }
    println!("Records written: {}", total.records_written());
}
