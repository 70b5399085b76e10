//! Flipwatch: an incremental crawler for business-for-sale marketplaces
//!
//! This crate crawls marketplace index pages, follows the linked detail pages,
//! extracts financial and traffic records from HTML tables and inline chart
//! scripts, and appends them to a document store without ever re-fetching or
//! re-storing a record it already knows about.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod sites;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Flipwatch operations
#[derive(Debug, Error)]
pub enum FlipwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

/// Errors raised while turning page content into records
///
/// Absence of a selector match is never one of these; it is an empty value.
/// These cover content that is present but cannot be interpreted, which
/// abandons the current page without affecting the rest of the run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No inline script contains marker '{0}'")]
    MissingScript(String),

    #[error("Date axis marker '{0}' not found in embedded data")]
    MissingAxis(String),

    #[error("Malformed embedded JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Missing required field '{field}' on {url}")]
    MissingField { field: &'static str, url: String },
}

/// Result type alias for Flipwatch operations
pub type Result<T> = std::result::Result<T, FlipwatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for extraction operations
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Coordinator;
pub use sites::SiteKind;
pub use state::{CompositeKey, DedupIndex};
