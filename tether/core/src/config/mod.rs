//! TOML Configuration File Support
//!
//! Centralized configuration loading, with a TOML file at
//! `~/.config/tether/tether.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [connection]
//! endpoint = "wss://agent.example.com/ws/{session}"
//! transport = "websocket"
//! heartbeat_interval_ms = 25000
//! reconnect_base_ms = 1000
//! max_reconnect_attempts = 5
//! connect_timeout_ms = 10000
//!
//! [reveal]
//! char_delay_min_ms = 12
//! char_delay_max_ms = 32
//! startup_delay_min_ms = 120
//! startup_delay_max_ms = 260
//! settle_window_ms = 400
//!
//! [run]
//! settle_delay_ms = 1500
//!
//! [http]
//! chat_url = "https://agent.example.com/chat"
//! command_url = "https://agent.example.com/command"
//! request_timeout_ms = 30000
//! privileged_prefixes = ["admin"]
//!
//! [session]
//! storage_path = "/home/me/.local/share/tether/session.json"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::{ConnectionConfig, HeartbeatConfig, ReconnectPolicy};
use crate::transport::TransportKind;
use crate::typewriter::RevealConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Stream endpoint, optionally containing `{session}`
    pub endpoint: Option<String>,

    /// Transport kind (`websocket` or `sse`)
    pub transport: Option<String>,

    /// Whether to send heartbeat pings
    pub heartbeat_enabled: Option<bool>,

    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: Option<u64>,

    /// Delay before the first reconnect attempt in milliseconds
    pub reconnect_base_ms: Option<u64>,

    /// Attempts before giving up
    pub max_reconnect_attempts: Option<u32>,

    /// Upper bound on one connect attempt in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Reveal section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealToml {
    /// Shortest per-character delay in milliseconds
    pub char_delay_min_ms: Option<u64>,

    /// Longest per-character delay in milliseconds
    pub char_delay_max_ms: Option<u64>,

    /// Shortest startup delay in milliseconds
    pub startup_delay_min_ms: Option<u64>,

    /// Longest startup delay in milliseconds
    pub startup_delay_max_ms: Option<u64>,

    /// Settle window in milliseconds
    pub settle_window_ms: Option<u64>,
}

/// Run section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunToml {
    /// Delay between a run finishing and resetting to idle, in milliseconds
    pub settle_delay_ms: Option<u64>,
}

/// HTTP section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpToml {
    /// Chat POST endpoint (streamed response)
    pub chat_url: Option<String>,

    /// Command POST endpoint
    pub command_url: Option<String>,

    /// Command request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,

    /// Command name prefixes that require a signature in visitor mode
    pub privileged_prefixes: Option<Vec<String>>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// File the session identifier is persisted in
    pub storage_path: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherToml {
    /// Connection configuration section
    pub connection: ConnectionToml,

    /// Reveal configuration section
    pub reveal: RevealToml,

    /// Run configuration section
    pub run: RunToml,

    /// HTTP configuration section
    pub http: HttpToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// HTTP endpoints and limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    /// Chat POST endpoint; when unset chat goes over the socket
    pub chat_url: Option<String>,
    /// Command POST endpoint
    pub command_url: Option<String>,
    /// Command request timeout
    pub request_timeout: Duration,
    /// Command name prefixes that require a signature in visitor mode
    pub privileged_prefixes: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            chat_url: None,
            command_url: None,
            request_timeout: Duration::from_secs(30),
            privileged_prefixes: vec!["admin".to_string()],
        }
    }
}

/// Centralized client configuration
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct TetherConfig {
    /// Stream endpoint, optionally containing `{session}`
    pub endpoint: String,

    /// Transport kind
    pub transport: TransportKind,

    /// Connection lifecycle settings
    pub connection: ConnectionConfig,

    /// Reveal pacing
    pub reveal: RevealConfig,

    /// Delay between a run finishing and resetting to idle
    pub settle_delay: Duration,

    /// HTTP endpoints
    pub http: HttpConfig,

    /// File the session identifier is persisted in (default: data dir)
    pub session_file: Option<PathBuf>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws/{session}".to_string(),
            transport: TransportKind::WebSocket,
            connection: ConnectionConfig::default(),
            reveal: RevealConfig::default(),
            settle_delay: Duration::from_millis(1500),
            http: HttpConfig::default(),
            session_file: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl TetherConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make the client misbehave
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError("endpoint is empty".to_string()));
        }
        let heartbeat = &self.connection.heartbeat;
        if heartbeat.enabled && heartbeat.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.connection.reconnect.base_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "reconnect base delay must be greater than zero".to_string(),
            ));
        }
        if self.reveal.char_delay_min > self.reveal.char_delay_max {
            return Err(ConfigError::ValidationError(
                "char delay min exceeds max".to_string(),
            ));
        }
        if self.reveal.startup_delay_min > self.reveal.startup_delay_max {
            return Err(ConfigError::ValidationError(
                "startup delay min exceeds max".to_string(),
            ));
        }
        Ok(())
    }

    /// Path the session identifier is persisted at
    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file
            .clone()
            .or_else(crate::identity::default_session_path)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/tether/tether.toml` or
/// `~/.config/tether/tether.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tether").join("tether.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<TetherConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<TetherConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading the environment through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<TetherConfig, ConfigError> {
    let mut config = TetherConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: TetherToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut TetherConfig, toml: &TetherToml) -> Result<(), ConfigError> {
    // Connection settings
    if let Some(ref endpoint) = toml.connection.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(ref transport) = toml.connection.transport {
        config.transport = TransportKind::parse(transport).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown transport '{transport}'"))
        })?;
    }
    if let Some(enabled) = toml.connection.heartbeat_enabled {
        config.connection.heartbeat.enabled = enabled;
    }
    if let Some(ms) = toml.connection.heartbeat_interval_ms {
        config.connection.heartbeat.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.connection.reconnect_base_ms {
        config.connection.reconnect.base_delay = Duration::from_millis(ms);
    }
    if let Some(attempts) = toml.connection.max_reconnect_attempts {
        config.connection.reconnect.max_attempts = attempts;
    }
    if let Some(ms) = toml.connection.connect_timeout_ms {
        config.connection.connect_timeout = Duration::from_millis(ms);
    }

    // Reveal settings
    let reveal = &toml.reveal;
    if let Some(ms) = reveal.char_delay_min_ms {
        config.reveal.char_delay_min = Duration::from_millis(ms);
    }
    if let Some(ms) = reveal.char_delay_max_ms {
        config.reveal.char_delay_max = Duration::from_millis(ms);
    }
    if let Some(ms) = reveal.startup_delay_min_ms {
        config.reveal.startup_delay_min = Duration::from_millis(ms);
    }
    if let Some(ms) = reveal.startup_delay_max_ms {
        config.reveal.startup_delay_max = Duration::from_millis(ms);
    }
    if let Some(ms) = reveal.settle_window_ms {
        config.reveal.settle_window = Duration::from_millis(ms);
    }

    // Run settings
    if let Some(ms) = toml.run.settle_delay_ms {
        config.settle_delay = Duration::from_millis(ms);
    }

    // HTTP settings
    if toml.http.chat_url.is_some() {
        config.http.chat_url.clone_from(&toml.http.chat_url);
    }
    if toml.http.command_url.is_some() {
        config.http.command_url.clone_from(&toml.http.command_url);
    }
    if let Some(ms) = toml.http.request_timeout_ms {
        config.http.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ref prefixes) = toml.http.privileged_prefixes {
        config.http.privileged_prefixes.clone_from(prefixes);
    }

    // Session settings
    if let Some(ref path) = toml.session.storage_path {
        config.session_file = Some(PathBuf::from(path));
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut TetherConfig, env: impl Fn(&str) -> Option<String>) {
    let mut touched = false;

    if let Some(endpoint) = env("TETHER_ENDPOINT") {
        config.endpoint = endpoint;
        touched = true;
    }
    if let Some(value) = env("TETHER_TRANSPORT") {
        match TransportKind::parse(&value) {
            Some(kind) => {
                config.transport = kind;
                touched = true;
            }
            None => tracing::warn!(value = %value, "Ignoring unknown TETHER_TRANSPORT"),
        }
    }
    if let Some(ms) = env("TETHER_HEARTBEAT_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.connection.heartbeat.interval = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(ms) = env("TETHER_RECONNECT_BASE_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.connection.reconnect.base_delay = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(attempts) =
        env("TETHER_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse::<u32>().ok())
    {
        config.connection.reconnect.max_attempts = attempts;
        touched = true;
    }
    if let Some(url) = env("TETHER_COMMAND_URL") {
        config.http.command_url = Some(url);
        touched = true;
    }
    if let Some(url) = env("TETHER_CHAT_URL") {
        config.http.chat_url = Some(url);
        touched = true;
    }
    if let Some(path) = env("TETHER_SESSION_FILE") {
        config.session_file = Some(PathBuf::from(path));
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint override
    pub endpoint: Option<String>,

    /// Transport override
    pub transport: Option<TransportKind>,

    /// Session file override
    pub session_file: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set transport override
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set session file override
    #[must_use]
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut TetherConfig) {
        if self.endpoint.is_some() || self.transport.is_some() || self.session_file.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref endpoint) = self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(ref path) = self.session_file {
            config.session_file = Some(path.clone());
        }
    }
}

/// Heartbeat + reconnect settings suitable for tests (short intervals)
#[must_use]
pub fn testing_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        heartbeat: HeartbeatConfig::for_testing(),
        reconnect: ReconnectPolicy::new(Duration::from_millis(100), 3),
        connect_timeout: Duration::from_secs(1),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TetherConfig::default();

        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.connection.heartbeat.interval, Duration::from_secs(25));
        assert_eq!(config.connection.reconnect.base_delay, Duration::from_millis(1000));
        assert_eq!(config.connection.reconnect.max_attempts, 5);
        assert_eq!(config.settle_delay, Duration::from_millis(1500));
        assert_eq!(config.reveal.char_delay_min, Duration::from_millis(12));
        assert_eq!(config.reveal.settle_window, Duration::from_millis(400));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("tether/tether.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[connection]
endpoint = "https://agent.test/stream"
transport = "sse"
heartbeat_interval_ms = 5000
reconnect_base_ms = 250
max_reconnect_attempts = 3

[reveal]
char_delay_min_ms = 1
char_delay_max_ms = 2

[run]
settle_delay_ms = 900

[http]
chat_url = "https://agent.test/chat"
command_url = "https://agent.test/command"
privileged_prefixes = ["admin", "reset"]

[session]
storage_path = "/tmp/tether-session.json"
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.endpoint, "https://agent.test/stream");
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.connection.heartbeat.interval, Duration::from_secs(5));
        assert_eq!(config.connection.reconnect, ReconnectPolicy::new(Duration::from_millis(250), 3));
        assert_eq!(config.reveal.char_delay_max, Duration::from_millis(2));
        assert_eq!(config.settle_delay, Duration::from_millis(900));
        assert_eq!(config.http.chat_url.as_deref(), Some("https://agent.test/chat"));
        assert_eq!(config.http.privileged_prefixes, vec!["admin", "reset"]);
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/tether-session.json")));
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_empty_toml() {
        let file = write_toml("");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.connection, ConnectionConfig::default());
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/tether/tether.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[connection\nendpoint = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let file = write_toml("[connection]\ntransport = \"pigeon\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[connection]\nendpoint = \"ws://file/ws\"\nmax_reconnect_attempts = 2\n");
        let env: HashMap<&str, &str> = HashMap::from([
            ("TETHER_ENDPOINT", "ws://env/ws"),
            ("TETHER_MAX_RECONNECT_ATTEMPTS", "9"),
            ("TETHER_HEARTBEAT_INTERVAL_MS", "not-a-number"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), |key| {
            env.get(key).map(|v| (*v).to_string())
        })
        .unwrap();

        assert_eq!(config.endpoint, "ws://env/ws");
        assert_eq!(config.connection.reconnect.max_attempts, 9);
        // Unparseable values are ignored
        assert_eq!(config.connection.heartbeat.interval, Duration::from_secs(25));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = TetherConfig::default();
        config.endpoint = "ws://env/ws".to_string();
        config.set_source(ConfigSource::Env);

        ConfigOverrides::new()
            .with_endpoint("ws://cli/ws".to_string())
            .with_transport(TransportKind::Sse)
            .apply(&mut config);

        assert_eq!(config.endpoint, "ws://cli/ws");
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = TetherConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = TetherConfig::default();
        config.connection.heartbeat.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = TetherConfig::default();
        config.reveal.char_delay_min = Duration::from_millis(50);
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.connection.reconnect.base_delay = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.connection.heartbeat = HeartbeatConfig::disabled().with_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ValidationError("bad".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad");
    }
}
