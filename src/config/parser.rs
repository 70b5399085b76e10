use crate::config::types::{Config, DATABASE_ENV_VAR};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The `FLIPWATCH_DATABASE` environment variable, when set and non-empty,
/// replaces `store.database-path` before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use flipwatch::config::load_config;
///
/// let config = load_config(Path::new("flipwatch.toml")).unwrap();
/// println!("Database: {}", config.store.database_path);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let mut config: Config = toml::from_str(&content)?;

    config.store.database_path = resolve_database_path(
        &config.store.database_path,
        std::env::var(DATABASE_ENV_VAR).ok(),
    );

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Picks the store target: a non-blank environment value wins over the file
pub fn resolve_database_path(configured: &str, env_value: Option<String>) -> String {
    match env_value {
        Some(value) if !value.trim().is_empty() => {
            tracing::debug!("Store target overridden by {}", DATABASE_ENV_VAR);
            value.trim().to_string()
        }
        _ => configured.to_string(),
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded on every run row so runs made with different settings can be
/// told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
max-concurrent-details = 4
request-timeout-secs = 20

[user-agent]
user-agent = "Mozilla/5.0 (X11; Linux x86_64)"
referer = "https://empireflippers.com/"

[store]
database-path = "./test.db"

[[site]]
kind = "empire"
start-url = "https://empireflippers.com/marketplace/"

[[site]]
kind = "fei"
start-url = "https://feinternational.com/buy-a-website/"
follow-details = false
listings-collection = "fei_listings"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent_details, 4);
        assert_eq!(config.crawler.max_retries, 2);
        assert_eq!(config.crawler.max_index_pages, 100);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].kind, SiteKind::Empire);
        assert!(config.sites[0].follow_details);
        assert!(!config.sites[1].follow_details);
        assert_eq!(
            config.sites[1].listings_collection.as_deref(),
            Some("fei_listings")
        );
    }

    #[test]
    fn test_store_section_is_optional() {
        let config_content = r#"
[crawler]
max-concurrent-details = 2
request-timeout-secs = 10

[user-agent]
user-agent = "flipwatch-test"
"#;

        let file = create_temp_config(config_content);
        let config: Config = toml::from_str(config_content).unwrap();
        assert_eq!(
            config.store.database_path,
            crate::config::DEFAULT_DATABASE_PATH
        );
        assert!(load_config(file.path()).is_ok());
    }

    #[test]
    fn test_env_override_wins_when_set() {
        assert_eq!(
            resolve_database_path("./a.db", Some("/var/lib/flipwatch.db".to_string())),
            "/var/lib/flipwatch.db"
        );
        assert_eq!(resolve_database_path("./a.db", None), "./a.db");
        assert_eq!(resolve_database_path("./a.db", Some("  ".to_string())), "./a.db");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/flipwatch.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_site_kind_is_parse_error() {
        let config_content = r#"
[crawler]
max-concurrent-details = 2
request-timeout-secs = 10

[user-agent]
user-agent = "flipwatch-test"

[[site]]
kind = "ebay"
start-url = "https://example.com/"
"#;
        let file = create_temp_config(config_content);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
max-concurrent-details = 0
request-timeout-secs = 10

[user-agent]
user-agent = "flipwatch-test"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
