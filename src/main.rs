//! Flipwatch main entry point
//!
//! This is the command-line interface for the Flipwatch marketplace crawler.

use anyhow::{Context, Result};
use clap::Parser;
use flipwatch::config::{load_config_with_hash, Config};
use flipwatch::crawler::Coordinator;
use flipwatch::output::{load_store_statistics, print_run_report, print_store_statistics};
use flipwatch::sites::{SiteBinding, SiteKind};
use flipwatch::storage::open_storage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Flipwatch: an incremental crawler for business-for-sale marketplaces
///
/// Flipwatch crawls marketplace index pages and their detail pages, and
/// stores every listing and detail record it has not stored before.
/// Running it again is cheap: known records are neither fetched nor stored.
#[derive(Parser, Debug)]
#[command(name = "flipwatch")]
#[command(version)]
#[command(about = "Incremental crawler for business-for-sale marketplaces", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl only this site (empire, flippa or fei)
    #[arg(long, value_name = "KIND")]
    site: Option<SiteKind>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, cli.site)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, config_hash, cli.site).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("flipwatch=info,warn"),
            1 => EnvFilter::new("flipwatch=debug,info"),
            2 => EnvFilter::new("flipwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, only: Option<SiteKind>) -> Result<()> {
    println!("=== Flipwatch Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent detail fetches: {}",
        config.crawler.max_concurrent_details
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Retries: {} (every {}ms)",
        config.crawler.max_retries, config.crawler.retry_delay_ms
    );
    println!("  Max index pages per site: {}", config.crawler.max_index_pages);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.user_agent);
    if let Some(referer) = &config.user_agent.referer {
        println!("  Referer: {}", referer);
    }

    println!("\nStore:");
    println!("  Database: {}", config.store.database_path);

    let entries: Vec<_> = config
        .sites
        .iter()
        .filter(|entry| entry.enabled)
        .filter(|entry| only.map_or(true, |kind| entry.kind == kind))
        .collect();

    println!("\nSites ({}):", entries.len());
    for entry in &entries {
        let binding = SiteBinding::resolve(entry)
            .with_context(|| format!("failed to resolve site {}", entry.kind))?;
        println!("  - {} from {}", binding.kind, binding.start_url);
        println!(
            "    listings -> {}, details -> {}{}",
            binding.sink.listings_collection,
            binding.sink.details_collection,
            if binding.follow_details {
                ""
            } else {
                " (details not followed)"
            }
        );
        if let Some(login) = &binding.login {
            let credential = if std::env::var(&login.password_env).is_ok() {
                "set"
            } else {
                "NOT SET"
            };
            println!(
                "    login as {} at {} (${} {})",
                login.email, login.url, login.password_env, credential
            );
        }
    }

    let disabled = config.sites.iter().filter(|entry| !entry.enabled).count();
    if disabled > 0 {
        println!("\nDisabled sites: {}", disabled);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let storage = open_storage(Path::new(&config.store.database_path))
        .context("failed to open the store")?;
    let stats = load_store_statistics(&storage).context("failed to read store statistics")?;
    print_store_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, only: Option<SiteKind>) -> Result<()> {
    let mut coordinator =
        Coordinator::from_config(config, config_hash).context("failed to start the crawl")?;
    if let Some(kind) = only {
        coordinator.restrict_to(kind)?;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight fetches are dropped");
            on_interrupt.cancel();
        }
    });

    let report = coordinator.run(cancel).await.context("crawl run failed")?;
    print_run_report(&report);

    Ok(())
}
