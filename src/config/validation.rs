use crate::config::types::{Config, CrawlerConfig, LoginConfig, SiteEntry, StoreConfig, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_store_config(&config.store)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_details < 1 || config.max_concurrent_details > 64 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-details must be between 1 and 64, got {}",
            config.max_concurrent_details
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.max_index_pages < 1 {
        return Err(ConfigError::Validation(
            "max-index-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates request identification
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;
    }

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates the site table: one entry per kind, reachable start URLs
fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    let mut kinds = HashSet::new();

    for entry in sites {
        if !kinds.insert(entry.kind) {
            return Err(ConfigError::Validation(format!(
                "Site kind '{}' is configured more than once",
                entry.kind
            )));
        }

        validate_http_url(&entry.start_url, "start-url")?;

        for collection in [&entry.listings_collection, &entry.details_collection]
            .into_iter()
            .flatten()
        {
            validate_collection_name(collection)?;
        }

        if let Some(login) = &entry.login {
            validate_login(login)?;
        }
    }

    Ok(())
}

fn validate_login(login: &LoginConfig) -> Result<(), ConfigError> {
    validate_http_url(&login.url, "login url")?;
    validate_email(&login.email)?;

    if login.password_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "login password-env cannot be empty".to_string(),
        ));
    }

    scraper::Selector::parse(&login.form_selector).map_err(|_| {
        ConfigError::Validation(format!(
            "login form-selector '{}' is not a valid CSS selector",
            login.form_selector
        ))
    })?;

    Ok(())
}

fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use an HTTP(S) scheme",
            what, value
        )));
    }

    Ok(())
}

/// Collection names end up in SQL rows; keep them to identifier characters
fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "Collection name '{}' must be non-empty and contain only [A-Za-z0-9_]",
            name
        )));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "login email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
