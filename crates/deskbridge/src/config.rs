//! Configuration file parsing and structures.
//!
//! deskbridge uses a single TOML file. Every section is optional and falls back
//! to defaults, so an empty file describes a single standing desk.

use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

use crate::smarthome::Device;
use crate::smarthome::DeviceInfo;
use crate::smarthome::DeviceName;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub assistant: AssistantConfig,
    pub device: DeviceConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `tower_http = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// HTTP facade bind address
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_string(),
            port: 8565,
        }
    }
}

/// Assistant platform (Home Graph) settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// The single account that owns every device
    pub agent_user_id: String,

    /// Base URL of the Home Graph API
    pub base_url: String,

    /// Service account key file. Report state is disabled when this is unset
    /// or cannot be loaded.
    pub key_file: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            agent_user_id: "23213213131321321321".to_string(),
            base_url: "https://homegraph.googleapis.com".to_string(),
            key_file: None,
        }
    }
}

/// The bridged device: its catalog entry and where its control API lives
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    pub default_names: Vec<String>,
    pub nicknames: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub hw_version: String,
    pub sw_version: String,

    /// Base URL of the device's HTTP control API (`{base_url}/mode/{mode}`)
    pub endpoint_url: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "standing-desk-123".to_string(),
            name: "Standing Desk".to_string(),
            default_names: vec!["My Standing Desk".to_string()],
            nicknames: vec!["Standing Desk".to_string()],
            manufacturer: "Wassim Chegham".to_string(),
            model: "123456789".to_string(),
            hw_version: "1.0".to_string(),
            sw_version: "1.0".to_string(),
            endpoint_url: "https://wassimchegham.ngrok.io".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Build the static catalog entry advertised on SYNC
    pub fn to_device(&self) -> Device {
        Device::switch(
            self.id.clone(),
            DeviceName {
                default_names: self.default_names.clone(),
                name: self.name.clone(),
                nicknames: self.nicknames.clone(),
            },
            DeviceInfo {
                manufacturer: self.manufacturer.clone(),
                model: self.model.clone(),
                hw_version: self.hw_version.clone(),
                sw_version: self.sw_version.clone(),
            },
        )
    }
}

/// Outbound HTTP client settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
