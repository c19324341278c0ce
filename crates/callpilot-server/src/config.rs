//! Server configuration loading from file and environment variables.

use callpilot_ami::{AmiConfig, TransferConfig};
use callpilot_dialer::DialerConfig;
use callpilot_dialogue::EngineConfig;
use callpilot_voice::{SttConfig, TtsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server network settings.
    pub server: ServerConfig,

    /// Database settings.
    pub database: DatabaseConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Dialer Agent API settings.
    pub dialer: DialerSection,

    /// PBX manager interface settings.
    pub ami: AmiConfig,

    /// Hand-off dialplan coordinates.
    pub transfer: TransferConfig,

    /// Speech-to-text settings.
    pub stt: SttConfig,

    /// Text-to-speech settings.
    pub tts: TtsConfig,

    /// Dialogue engine settings.
    pub dialogue: EngineConfig,

    /// API authentication settings.
    pub auth: AuthConfig,

    /// Rate limiting settings.
    pub limits: LimitsConfig,

    /// Background sync settings.
    pub sync: SyncConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: IpAddr,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "callpilot.db".to_string(),
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "callpilot_server=debug,info").
    pub level: String,

    /// Whether to output logs in JSON format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Dialer section: the client config plus the default password used when
/// provisioning agents that were never given one of their own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DialerSection {
    /// Agent API client settings.
    #[serde(flatten)]
    pub client: DialerConfig,

    /// Password used for dialer-side agent accounts when the caller does
    /// not supply one.
    pub default_agent_pass: String,
}

/// API authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// API key required on mutating routes. Empty leaves them open.
    pub api_key: String,
}

/// Rate limiting settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Requests allowed per client IP per minute.
    pub per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { per_minute: 300 }
    }
}

/// Background sync settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between sync passes. Zero disables the task.
    pub interval_seconds: u64,

    /// Sessions older than this are refreshed.
    pub session_max_age_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            session_max_age_seconds: 3_600,
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
/// - `CALLPILOT_HOST` / `CALLPILOT_PORT` override `server.*`
/// - `CALLPILOT_DB_PATH` overrides `database.path`
/// - `CALLPILOT_LOG_LEVEL` / `CALLPILOT_LOG_JSON` override `logging.*`
/// - `CALLPILOT_API_KEY` overrides `auth.api_key`
/// - `CALLPILOT_DIALER_URL` / `CALLPILOT_DIALER_USER` / `CALLPILOT_DIALER_PASS`
///   override the dialer client credentials
/// - `CALLPILOT_AMI_HOST` / `CALLPILOT_AMI_SECRET` override the manager
///   connection
/// - `CALLPILOT_STT_URL`, `CALLPILOT_TTS_URL`, `CALLPILOT_TTS_KEY` override
///   the speech endpoints
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

    if let Ok(host) = std::env::var("CALLPILOT_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("CALLPILOT_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("CALLPILOT_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("CALLPILOT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("CALLPILOT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(key) = std::env::var("CALLPILOT_API_KEY") {
        config.auth.api_key = key;
    }
    if let Ok(url) = std::env::var("CALLPILOT_DIALER_URL") {
        config.dialer.client.base_url = url;
    }
    if let Ok(user) = std::env::var("CALLPILOT_DIALER_USER") {
        config.dialer.client.api_user = user;
    }
    if let Ok(pass) = std::env::var("CALLPILOT_DIALER_PASS") {
        config.dialer.client.api_pass = pass;
    }
    if let Ok(host) = std::env::var("CALLPILOT_AMI_HOST") {
        config.ami.host = host;
    }
    if let Ok(secret) = std::env::var("CALLPILOT_AMI_SECRET") {
        config.ami.secret = secret;
    }
    if let Ok(url) = std::env::var("CALLPILOT_STT_URL") {
        config.stt.url = url;
    }
    if let Ok(url) = std::env::var("CALLPILOT_TTS_URL") {
        config.tts.url = url;
    }
    if let Ok(key) = std::env::var("CALLPILOT_TTS_KEY") {
        config.tts.api_key = key;
    }

    Ok(config)
}
