use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Values supplied on the command line or through the environment
///
/// Each `Some` field replaces the corresponding value from the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub save_root: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
}

/// Loads and parses a configuration file from the given path
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
/// use hn_mirror::config::load_config;
///
/// let config = load_config(Path::new("hn-mirror.toml")).unwrap();
/// println!("Polling every {}s", config.poller.poll_interval_secs);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let (config, _) = read_config(path)?;
    validate(&config)?;
    Ok(config)
}

/// Parses the file and hashes its content, without validating
fn read_config(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok((config, hash_content(&content)))
}

/// Hex-encoded SHA-256 of the configuration file content
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds the effective configuration for a run
///
/// Starts from the file at `path` (or the built-in defaults when no file is
/// given), applies `overrides`, and validates the result once. A file value
/// that only an override makes valid is therefore accepted. The file hash is
/// returned alongside when a file was read.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(Config, Option<String>), ConfigError> {
    let (mut config, hash) = match path {
        Some(path) => {
            let (config, hash) = read_config(path)?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    apply_overrides(&mut config, overrides);
    validate(&config)?;

    Ok((config, hash))
}

fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(save_root) = &overrides.save_root {
        config.output.save_root = save_root.clone();
    }
    if let Some(ledger_path) = &overrides.ledger_path {
        config.output.ledger_path = Some(ledger_path.clone());
    }
    if let Some(secs) = overrides.poll_interval_secs {
        config.poller.poll_interval_secs = secs;
    }
}
