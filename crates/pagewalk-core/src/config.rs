//! Configuration for fetching and for the scrape loop.
//!
//! Configuration is stored in TOML. The fetch section is opaque to the engine:
//! it is forwarded unmodified to whichever [`FetchClient`](crate::FetchClient)
//! performs the requests. The scrape section tunes the loop itself.
//!
//! ## Location
//!
//! 1. `$PAGEWALK_CONFIG` if set (path to a TOML file)
//! 2. `<platform config dir>/pagewalk/config.toml`
//!
//! A missing file yields [`Config::default`].
//!
//! ## Example Configuration File
//!
//! ```toml
//! [fetch]
//! timeout_secs = 20
//! retries = 2
//! retry_wait_ms = 500
//! verify = true
//! cache_mode = "default"
//!
//! [scrape]
//! fail_fast = false
//! max_connections = 4
//! max_pages = 200
//! ```
//!
//! ```rust
//! use pagewalk_core::Config;
//!
//! let config = Config::from_toml("[scrape]\nfail_fast = true\n")?;
//! assert!(config.scrape.fail_fast);
//! assert_eq!(config.fetch.retries, 0);
//! # Ok::<(), pagewalk_core::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_ENV: &str = "PAGEWALK_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Options forwarded to the fetch client.
    pub fetch: FetchOptions,
    /// Scrape loop tuning.
    pub scrape: ScrapeConfig,
}

/// Pass-through options for the fetch client.
///
/// The engine never interprets these; it hands them to
/// [`FetchClient::fetch`](crate::FetchClient::fetch) with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Whether TLS certificates are verified.
    pub verify: bool,
    /// Number of retries after the first attempt for recoverable failures.
    pub retries: u32,
    /// Initial wait between retries in milliseconds, doubled after each attempt.
    pub retry_wait_ms: u64,
    /// Response cache behaviour.
    pub cache_mode: CacheMode,
    /// User-Agent header, when set.
    pub user_agent: Option<String>,
}

impl FetchOptions {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Initial retry wait as a [`Duration`].
    #[must_use]
    pub const fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify: true,
            retries: 0,
            retry_wait_ms: 1000,
            cache_mode: CacheMode::Default,
            user_agent: None,
        }
    }
}

/// How a fetch client should use its response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Read cached responses and store new ones.
    #[default]
    Default,
    /// Always fetch, but store the fresh response.
    Refresh,
    /// Bypass the cache entirely.
    Off,
}

/// Scrape loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// End the run at the first page failure instead of only at seed failures.
    pub fail_fast: bool,
    /// Maximum number of fetches in flight at once.
    pub max_connections: usize,
    /// Maximum number of pages followed in one pagination chain.
    pub max_pages: Option<usize>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_connections: 4,
            max_pages: None,
        }
    }
}

impl Config {
    /// Load configuration from `$PAGEWALK_CONFIG` or the platform config
    /// directory, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.scrape.max_connections == 0 {
            return Err(Error::Config(
                "scrape.max_connections must be at least 1".into(),
            ));
        }
        if self.scrape.max_pages == Some(0) {
            return Err(Error::Config("scrape.max_pages must be at least 1".into()));
        }
        Ok(())
    }

    /// Path of the configuration file that [`Config::load`] reads.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(explicit));
        }
        let project_dirs = directories::ProjectDirs::from("dev", "pagewalk", "pagewalk")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }
}
