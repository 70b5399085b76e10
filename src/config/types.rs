use crate::sites::SiteKind;
use serde::Deserialize;

/// Default SQLite database location when neither config nor environment set one
pub const DEFAULT_DATABASE_PATH: &str = "./flipwatch.db";

/// Environment variable that overrides `store.database-path`
pub const DATABASE_ENV_VAR: &str = "FLIPWATCH_DATABASE";

/// Main configuration structure for Flipwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of detail pages fetched in parallel for one index page
    pub max_concurrent_details: u32,

    /// Whole-request timeout for a single fetch (seconds)
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for transient transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on index pages visited per site in one run
    #[serde(default = "default_max_index_pages")]
    pub max_index_pages: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_max_index_pages() -> u32 {
    100
}

/// Request identification
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Value sent in the User-Agent header
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Optional Referer header sent with every request
    #[serde(default)]
    pub referer: Option<String>,
}

/// Persisted store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// One marketplace to crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteEntry {
    /// Which extraction profile to use
    pub kind: SiteKind,

    /// First index page of the marketplace
    pub start_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether detail pages are followed for this site
    #[serde(default = "default_true")]
    pub follow_details: bool,

    /// Collection listings are written to (defaults per kind)
    #[serde(default)]
    pub listings_collection: Option<String>,

    /// Collection detail records are written to (defaults per kind)
    #[serde(default)]
    pub details_collection: Option<String>,

    #[serde(default)]
    pub login: Option<LoginConfig>,
}

fn default_true() -> bool {
    true
}

/// Form login performed once before the first index fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoginConfig {
    /// Page hosting the login form
    pub url: String,

    /// CSS selector of the login form on that page
    #[serde(default = "default_form_selector")]
    pub form_selector: String,

    pub email: String,

    /// Name of the environment variable holding the password
    pub password_env: String,
}

fn default_form_selector() -> String {
    "form".to_string()
}
