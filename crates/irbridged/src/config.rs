//! Configuration file parsing and structures.
//!
//! irbridged uses TOML for declarative configuration. The only integration is
//! the native Tasmota MQTT bridge; the daemon is useless without it, so
//! `main` refuses to start when `[integrations.mqtt]` is absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    pub integrations: IntegrationsConfig,
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
}

/// Where the persisted device cache lives.
///
/// The cache is a single JSON document (`devices.json`) rewritten wholesale
/// on every mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted state
    pub path: PathBuf,
}

/// Native HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,

    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8566
}

/// Integration configuration container
#[derive(Debug, Deserialize)]
pub struct IntegrationsConfig {
    /// Native Tasmota MQTT integration
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

/// Native Tasmota MQTT integration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT client ID (default derived from the local hostname)
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Tasmota discovery topic wildcard
    #[serde(default = "default_discovery_topic")]
    pub discovery_topic: String,

    /// Expected `md` (model) string in discovery payloads. Discovery messages
    /// from unrelated Tasmota devices are ignored.
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("irbridged-{}", host)
}

fn default_discovery_topic() -> String {
    "tasmota/discovery/+/config".to_string()
}

fn default_model() -> String {
    "Athom lR Remote".to_string()
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
