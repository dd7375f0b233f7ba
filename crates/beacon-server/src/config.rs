//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Status aggregation settings.
    #[serde(default)]
    pub status: StatusConfig,

    /// Uptime poller settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Status aggregation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Trailing window, in hours, for incidents on the status document.
    #[serde(default = "default_incident_window_hours")]
    pub incident_window_hours: u32,

    /// How status transitions relate to incident bookkeeping:
    /// `"manual"` (transitions never touch incidents) or
    /// `"open_on_outage"` (entering Outage opens an incident, leaving it
    /// resolves the open ones).
    #[serde(default = "default_incident_policy")]
    pub incident_policy: String,
}

/// Uptime poller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Whether the background poller runs at all.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between poll ticks.
    #[serde(default = "default_poll_interval_seconds")]
    pub interval_seconds: u64,

    /// Timeout, in milliseconds, for one health probe request.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "beacon_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "beacon.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_incident_window_hours() -> u32 {
    24
}

fn default_incident_policy() -> String {
    "manual".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            incident_window_hours: default_incident_window_hours(),
            incident_policy: default_incident_policy(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_poll_interval_seconds(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `BEACON_HOST` overrides `server.host`
/// - `BEACON_PORT` overrides `server.port`
/// - `BEACON_DB_PATH` overrides `database.path`
/// - `BEACON_POLL_ENABLED` overrides `poller.enabled` (set to "true" to enable)
/// - `BEACON_LOG_LEVEL` overrides `logging.level`
/// - `BEACON_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("BEACON_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("BEACON_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("BEACON_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(enabled) = std::env::var("BEACON_POLL_ENABLED") {
        config.poller.enabled = enabled == "true" || enabled == "1";
    }
    if let Ok(level) = std::env::var("BEACON_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("BEACON_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
