//! Configuration management for the syncpair CLI
//!
//! Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/syncpair/syncpair.toml`
//! - macOS: `~/Library/Application Support/io.syncpair.syncpair/syncpair.toml`
//! - Windows: `%APPDATA%\syncpair\syncpair\config\syncpair.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use syncpair_core::PairingConfig;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [relay]
/// base_url = "https://sync.example.com/sync"
/// poll_interval_secs = 5
/// request_timeout_secs = 30
///
/// [device]
/// name = "Work laptop"
/// device_type = "desktop"
///
/// [account]
/// store_path = ""  # Empty = default location
/// seamless_switching = false
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL the `/exchange` and `/connect` endpoints live under
    #[serde(default = "default_relay_url")]
    pub base_url: String,

    /// Seconds between two polls of the same slot
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Timeout of a single relay request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Host pairing links must be on (empty = any host)
    #[serde(default)]
    pub link_host: Option<String>,
}

fn default_relay_url() -> String {
    "https://sync.syncpair.io/sync".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_url(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            link_host: None,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name shown to the other device (empty = "syncpair CLI")
    #[serde(default)]
    pub name: Option<String>,

    /// Device type registered with the account
    #[serde(default = "default_device_type")]
    pub device_type: String,
}

fn default_device_type() -> String {
    "desktop".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            device_type: default_device_type(),
        }
    }
}

/// Account configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Path to the local account file (empty = default location)
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Offer to switch accounts when a recovery code belongs to another account
    #[serde(default)]
    pub seamless_switching: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            verbose: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("syncpair.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "syncpair", "syncpair")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for the account file)
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "syncpair", "syncpair")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.relay.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.relay.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let url = &self.relay.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid relay URL '{}': must start with http:// or https://",
                url
            )));
        }
        url::Url::parse(url)
            .map_err(|e| ConfigError::ValidationError(format!("Invalid relay URL '{url}': {e}")))?;

        if self.device.device_type.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device_type must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Device name, falling back to a generic one
    pub fn device_name(&self) -> String {
        self.device
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("syncpair CLI")
            .to_string()
    }

    /// Path of the local account file
    pub fn account_store_path(&self) -> Option<PathBuf> {
        self.account
            .store_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| Self::data_dir().map(|dir| dir.join("account.json")))
    }

    /// Controller settings derived from this configuration
    pub fn pairing_config(&self, source: &str) -> PairingConfig {
        PairingConfig {
            device_name: self.device_name(),
            device_type: self.device.device_type.clone(),
            source: Some(source.to_string()),
            poll_interval: Duration::from_secs(self.relay.poll_interval_secs),
            seamless_account_switching: self.account.seamless_switching,
            link_host: self.relay.link_host.clone().filter(|h| !h.is_empty()),
        }
    }

    /// Generate a sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# syncpair configuration

[relay]
# Base URL the /exchange and /connect endpoints live under
base_url = "https://sync.syncpair.io/sync"
# Seconds between two polls of the same slot
poll_interval_secs = 5
# Timeout of a single relay request in seconds
request_timeout_secs = 30
# Host pairing links must be on (empty = any host)
# link_host = "syncpair.io"

[device]
# Name shown to the other device
# name = "Work laptop"
device_type = "desktop"

[account]
# Path to the local account file (empty = default location)
# store_path = ""
# Offer to switch accounts when a recovery code belongs to another account
seamless_switching = false

[output]
# Output format: "table", "json", "quiet"
format = "table"
verbose = false

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Output format override
    pub output_format: Option<String>,
    /// Verbose flag override
    pub verbose: Option<bool>,
    /// Debug flag override
    pub debug: Option<bool>,
    /// Relay base URL override
    pub relay_url: Option<String>,
    /// Device name override
    pub device_name: Option<String>,
    /// Account file override
    pub account_file: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
        if let Some(true) = overrides.debug {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref url) = overrides.relay_url {
            if !url.is_empty() {
                self.relay.base_url = url.clone();
            }
        }
        if let Some(ref name) = overrides.device_name {
            if !name.is_empty() {
                self.device.name = Some(name.clone());
            }
        }
        if let Some(ref path) = overrides.account_file {
            self.account.store_path = Some(path.clone());
        }
        self
    }
}
