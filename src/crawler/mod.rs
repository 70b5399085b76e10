//! Crawler module for fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - The fetch capability and its HTTP implementation with bounded retry
//! - The login step for sites that need a session
//! - The bounded worker pool for detail pages
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod login;
mod scheduler;

pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, fetch_cancellable, Fetch, FetchError, FetchRequest, FetchedPage,
    HttpFetcher,
};
pub use login::{login, login_form};
pub use scheduler::{DetailContext, DetailOutcome, DetailResult, Scheduler};

use crate::config::Config;
use crate::output::RunReport;
use crate::FlipwatchError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the store and build the HTTP fetcher
/// 2. Record a new crawl run
/// 3. Crawl every enabled site in configuration order
/// 4. Mark the run completed, interrupted or failed
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `cancel` - Cancelling this token stops the run at the next fetch
///
/// # Example
///
/// ```no_run
/// use flipwatch::config::load_config_with_hash;
/// use flipwatch::crawler::crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("flipwatch.toml"))?;
/// let report = crawl(config, hash, CancellationToken::new()).await?;
/// println!("{} records written", report.total().records_written());
/// # Ok(())
/// # }
/// ```
pub async fn crawl(
    config: Config,
    config_hash: String,
    cancel: CancellationToken,
) -> Result<RunReport, FlipwatchError> {
    let coordinator = Coordinator::from_config(config, config_hash)?;
    coordinator.run(cancel).await
}
