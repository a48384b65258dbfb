//! Configuration module for the tidepool server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "tidepool")]
#[command(author = "tidepool authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal multiplexed TCP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of simultaneously connected clients
    #[arg(short = 'n', long)]
    pub max_connections: Option<usize>,

    /// Listen backlog passed to listen(2)
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Poll timeout in microseconds
    #[arg(long)]
    pub poll_interval_us: Option<u64>,

    /// Handler set to run
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Emit loop diagnostics (poll counts, accepts, reaps)
    #[arg(short, long)]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Handler set the binary installs on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Write every received chunk back to its sender.
    Echo,
    /// Line protocol answering PING with PONG.
    Ping,
    /// Relay each client's data to every other client on idle ticks.
    Broadcast,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            poll_interval_us: default_poll_interval_us(),
            protocol: default_protocol(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Loop diagnostics
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    200
}

fn default_backlog() -> i32 {
    128
}

fn default_poll_interval_us() -> u64 {
    10
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Echo
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub backlog: i32,
    pub poll_interval: Duration,
    pub protocol: ProtocolType,
    pub debug: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::parse_from(["tidepool"]), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let server = toml_config.server;
        Config {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            max_connections: cli.max_connections.unwrap_or(server.max_connections),
            backlog: cli.backlog.unwrap_or(server.backlog),
            poll_interval: Duration::from_micros(
                cli.poll_interval_us.unwrap_or(server.poll_interval_us),
            ),
            protocol: cli.protocol.unwrap_or(server.protocol),
            debug: cli.debug || toml_config.logging.debug,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// `host:port` as given, for resolution and logging.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_connections, 200);
        assert!(!config.debug);
        assert_eq!(config.poll_interval, Duration::from_micros(10));
        assert_eq!(config.protocol, ProtocolType::Echo);
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            max_connections = 16
            poll_interval_us = 500
            protocol = "broadcast"

            [logging]
            level = "warn"
            debug = true
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.poll_interval_us, 500);
        assert_eq!(config.server.protocol, ProtocolType::Broadcast);
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.debug);
    }

    #[test]
    fn test_cli_overrides_file() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            max_connections = 16
        "#,
        )
        .unwrap();
        let cli = CliArgs::parse_from(["tidepool", "--port", "7000", "--protocol", "ping", "-d"]);

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.port, 7000);
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.protocol, ProtocolType::Ping);
        assert!(config.debug);
        assert_eq!(config.log_level, "info");
    }
}
