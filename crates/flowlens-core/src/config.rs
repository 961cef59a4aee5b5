//! Configuration management for flowlens.
//!
//! Loads configuration from ${FLOWLENS_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::OrphanPolicy;

/// Environment variable overriding the server URL.
pub const SERVER_URL_ENV: &str = "FLOWLENS_SERVER_URL";

pub mod paths {
    //! Path resolution for flowlens configuration.
    //!
    //! FLOWLENS_HOME resolution order:
    //! 1. FLOWLENS_HOME environment variable (if set)
    //! 2. ~/.config/flowlens (default)

    use std::path::PathBuf;

    /// Returns the flowlens home directory.
    pub fn flowlens_home() -> PathBuf {
        if let Ok(home) = std::env::var("FLOWLENS_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("flowlens"))
            .unwrap_or_else(|| PathBuf::from(".flowlens"))
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        flowlens_home().join("config.toml")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the execution server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Path of the run endpoint, appended to the server URL
    pub stream_path: String,

    /// Connect timeout in seconds (0 disables)
    pub connect_timeout_secs: u64,

    /// What to do with nodes still running when the workflow completes
    pub orphan_policy: OrphanPolicy,

    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            stream_path: Self::DEFAULT_STREAM_PATH.to_string(),
            connect_timeout_secs: Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            orphan_policy: OrphanPolicy::default(),
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
    const DEFAULT_STREAM_PATH: &str = "/api/workflows/run";
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_LOG_LEVEL: &str = "warn";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        let contents = toml::to_string_pretty(&Config::default())
            .context("Failed to serialize default config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Server URL with env > config > default precedence.
    pub fn effective_server_url(&self) -> Result<String> {
        resolve_base_url(self.server_url.as_deref(), SERVER_URL_ENV, Self::DEFAULT_SERVER_URL)
    }

    /// Full URL of the run endpoint.
    pub fn stream_url(&self) -> Result<String> {
        let base = self.effective_server_url()?;
        Ok(join_url(&base, &self.stream_path))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.connect_timeout_secs))
        }
    }
}

/// Resolves a base URL: env var, then config value, then default.
pub fn resolve_base_url(
    config_url: Option<&str>,
    env_var: &str,
    default_url: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    if let Some(config_url) = config_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(default_url.to_string())
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid server URL: {url}"))?;
    Ok(())
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
