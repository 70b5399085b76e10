//! Per-marketplace extraction profiles
//!
//! Each supported marketplace is a [`SiteKind`]. The kind is resolved once at
//! startup into a [`SiteBinding`] carrying its start URL, login step and the
//! collections it writes to; page parsing is dispatched with a `match` on the
//! kind.
//!
//! # Components
//!
//! - `empire`: listing batch embedded as JSON, chart-script detail pages
//! - `flippa`: link-list index pages, detail pages that yield the listing
//! - `fei`: HTML listing blocks, chart-script detail pages

mod empire;
mod fei;
mod flippa;

use crate::config::{LoginConfig, SiteEntry};
use crate::extract::Page;
use crate::state::CompositeKey;
use crate::storage::{DetailRecord, Listing, RecordKind, SinkBinding};
use crate::{ConfigError, ConfigResult, ExtractResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Supported marketplaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    /// empireflippers.com
    Empire,
    /// flippa.com
    Flippa,
    /// feinternational.com
    Fei,
}

impl SiteKind {
    pub const ALL: [SiteKind; 3] = [SiteKind::Empire, SiteKind::Flippa, SiteKind::Fei];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empire => "empire",
            Self::Flippa => "flippa",
            Self::Fei => "fei",
        }
    }

    /// Collections used when the config does not name any
    pub fn default_sink(&self) -> SinkBinding {
        let prefix = match self {
            Self::Empire => "empireflippers",
            Self::Flippa => "flippa",
            Self::Fei => "fei",
        };
        SinkBinding {
            listings_collection: format!("{}_listings", prefix),
            details_collection: format!("{}_details", prefix),
        }
    }

    /// Whether the index must be fetched with a logged-in session
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Flippa)
    }
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empire" => Ok(Self::Empire),
            "flippa" => Ok(Self::Flippa),
            "fei" => Ok(Self::Fei),
            other => Err(format!(
                "unknown site kind '{}' (expected empire, flippa or fei)",
                other
            )),
        }
    }
}

/// A configured site resolved into everything one crawl of it needs
#[derive(Debug, Clone)]
pub struct SiteBinding {
    pub kind: SiteKind,
    pub start_url: Url,
    pub follow_details: bool,
    pub login: Option<LoginConfig>,
    pub sink: SinkBinding,
}

impl SiteBinding {
    /// Resolves a validated site entry
    pub fn resolve(entry: &SiteEntry) -> ConfigResult<Self> {
        let start_url = Url::parse(&entry.start_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", entry.start_url, e)))?;

        if entry.kind.requires_login() && entry.login.is_none() {
            tracing::warn!(
                "Site {} normally requires login but no [site.login] is configured",
                entry.kind
            );
        }

        let defaults = entry.kind.default_sink();
        Ok(Self {
            kind: entry.kind,
            start_url,
            follow_details: entry.follow_details,
            login: entry.login.clone(),
            sink: SinkBinding {
                listings_collection: entry
                    .listings_collection
                    .clone()
                    .unwrap_or(defaults.listings_collection),
                details_collection: entry
                    .details_collection
                    .clone()
                    .unwrap_or(defaults.details_collection),
            },
        })
    }
}

/// A detail page to fetch, with the context needed to parse it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailTask {
    pub source: SiteKind,
    pub listing_id: String,
    pub url: Url,
    /// Namespace the fetched record belongs to
    pub yields: RecordKind,
    /// Key of the record the fetch will produce
    pub key: CompositeKey,
}

/// One candidate found on an index page
#[derive(Debug, Clone, Default)]
pub struct IndexItem {
    /// Listing to persist straight from the index, if the index carries one
    pub listing: Option<Listing>,
    /// Detail page to follow, if any
    pub detail: Option<DetailTask>,
}

/// Everything extracted from one index page
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    /// Candidates in page order
    pub items: Vec<IndexItem>,
    /// Entries dropped because no identity could be read
    pub rejected: usize,
    pub next_page: Option<Url>,
}

/// Record produced by a detail page
#[derive(Debug, Clone, PartialEq)]
pub enum DetailPayload {
    Series(DetailRecord),
    Listing(Listing),
}

/// Extracts items and the next-page link from an index page
pub fn parse_index(kind: SiteKind, page: &Page, follow_details: bool) -> ExtractResult<IndexPage> {
    match kind {
        SiteKind::Empire => empire::parse_index(page, follow_details),
        SiteKind::Flippa => flippa::parse_index(page, follow_details),
        SiteKind::Fei => fei::parse_index(page, follow_details),
    }
}

/// Extracts the record a detail page holds
pub fn parse_detail(task: &DetailTask, page: &Page) -> ExtractResult<DetailPayload> {
    match task.source {
        SiteKind::Empire => empire::parse_detail(task, page).map(DetailPayload::Series),
        SiteKind::Flippa => flippa::parse_detail(task, page).map(DetailPayload::Listing),
        SiteKind::Fei => fei::parse_detail(task, page).map(DetailPayload::Series),
    }
}
