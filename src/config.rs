//! Configuration for the lwmsg binary.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use crate::handler::HandlerKind;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default port for both server and client.
pub const DEFAULT_PORT: u16 = 7657;

/// Default client receive timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "lwmsg")]
#[command(version)]
#[command(about = "One-shot TCP request/response messaging", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Accept connections and answer each request with the handler
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Built-in handler to answer with
        #[arg(long, value_enum)]
        handler: Option<HandlerKind>,

        /// Number of runtime worker threads (defaults to number of CPU cores)
        #[arg(short = 'w', long)]
        workers: Option<usize>,
    },
    /// Send one message and print the response
    Send {
        /// Message to send; the '>' terminator is appended if missing
        message: String,

        /// Server address
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds to wait for the response
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub handler: HandlerKind,
    /// Number of runtime worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
            handler: HandlerKind::default(),
            workers: None,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_client_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Receive timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_client_host(),
            port: default_port(),
            timeout: default_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_client_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the binary should do, with all settings resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve {
        host: String,
        port: u16,
        handler: HandlerKind,
        workers: Option<usize>,
    },
    Send {
        host: String,
        port: u16,
        timeout: u64,
        message: String,
    },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = match cli.config {
            Some(ref path) => load_toml(path)?,
            None => TomlConfig::default(),
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mode = match cli.command {
            CliCommand::Serve {
                host,
                port,
                handler,
                workers,
            } => Mode::Serve {
                host: host.unwrap_or(toml_config.server.host),
                port: port.unwrap_or(toml_config.server.port),
                handler: handler.unwrap_or(toml_config.server.handler),
                workers: workers.or(toml_config.server.workers),
            },
            CliCommand::Send {
                message,
                host,
                port,
                timeout,
            } => Mode::Send {
                host: host.unwrap_or(toml_config.client.host),
                port: port.unwrap_or(toml_config.client.port),
                timeout: timeout.unwrap_or(toml_config.client.timeout),
                message,
            },
        };

        Config {
            mode,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

fn load_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}
