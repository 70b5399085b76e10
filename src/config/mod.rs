//! Configuration module for Flipwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use flipwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("flipwatch.toml")).unwrap();
//! println!("Sites configured: {}", config.sites.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, LoginConfig, SiteEntry, StoreConfig, UserAgentConfig,
    DATABASE_ENV_VAR, DEFAULT_DATABASE_PATH,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, resolve_database_path};
