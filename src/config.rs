//! Connection settings
//!
//! Resolved from, highest precedence first: command-line flags, the
//! `GERRIT_*` environment variables (both via clap), and
//! `~/.config/gerritctl/config.toml`.

use anyhow::{Context, Result, bail};
use gerritkit::{ClientConfig, Credentials, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::ConnectionArgs;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

/// Contents of the config file
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Attempts per read, including the first
    pub retries: Option<u32>,
}

/// Fully resolved connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

/// Get the default config file path
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("gerritctl").join("config.toml"))
}

/// Load the config file.
///
/// A missing default file yields an empty config; a missing explicit file is
/// an error.
pub fn load_file(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            (PathBuf::from(expanded), true)
        }
        None => (default_config_path()?, false),
    };

    if !path.exists() {
        if required {
            bail!("Config file not found: {}", path.display());
        }
        log::debug!("No config file at {}", path.display());
        return Ok(FileConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Merge flags over the config file.
pub fn resolve(flags: &ConnectionArgs, file: FileConfig) -> Result<Settings> {
    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

    let Some(url) = non_empty(&flags.url).or(file.url) else {
        bail!("No Gerrit URL configured (use --url, GERRIT_URL or the config file)");
    };

    let username = non_empty(&flags.username).or(file.username);
    let password = non_empty(&flags.password).or(file.password);
    if username.is_some() && password.is_none() {
        bail!("A username was given without a password (use --password or GERRIT_ADMIN_PASSWORD)");
    }

    Ok(Settings {
        url,
        username,
        password,
        timeout_secs: file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        retries: file.retries.unwrap_or(DEFAULT_RETRIES),
    })
}

impl Settings {
    /// Client configuration for these settings
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.url.clone())
            .timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .retry(RetryConfig::attempts(self.retries));
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config = config.credentials(Credentials::new(username.clone(), password.clone()));
        }
        config
    }
}
