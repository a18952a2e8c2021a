//! Configuration module for arq-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::AcceptBackoff;

/// Well-known endpoint path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/arq_socket";

/// Pending-connection queue length for the listening socket.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "arq-server")]
#[command(author = "arq-server authors")]
#[command(version = "0.1.0")]
#[command(about = "Acknowledges one message per connection on a Unix socket", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Unix socket path (e.g., /tmp/arq_socket)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    /// Listen backlog
    #[arg(short, long, global = true)]
    pub backlog: Option<i32>,

    /// Remove a leftover socket file from a previous run before binding
    #[arg(long, global = true)]
    pub remove_stale: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Accept connections and acknowledge one message each (default)
    Serve,
    /// Send one message to a running server and print the reply
    Send {
        /// Message text
        message: String,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub accept: AcceptConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_remove_stale")]
    pub remove_stale: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            backlog: default_backlog(),
            remove_stale: default_remove_stale(),
        }
    }
}

/// Accept loop retry policy
#[derive(Debug, Deserialize, Default)]
pub struct AcceptConfig {
    /// First delay after a failed accept, in milliseconds (0 = retry at once)
    #[serde(default)]
    pub backoff_initial_ms: u64,
    /// Upper bound for the delay, in milliseconds (defaults to the initial delay)
    #[serde(default)]
    pub backoff_max_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
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

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_remove_stale() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub socket_path: PathBuf,
    pub backlog: i32,
    pub remove_stale: bool,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: default_socket_path(),
            backlog: default_backlog(),
            remove_stale: default_remove_stale(),
            backoff_initial: Duration::ZERO,
            backoff_max: Duration::ZERO,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: &CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            socket_path: cli
                .socket
                .clone()
                .unwrap_or(toml_config.server.socket_path),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            remove_stale: cli.remove_stale.unwrap_or(toml_config.server.remove_stale),
            backoff_initial: Duration::from_millis(toml_config.accept.backoff_initial_ms),
            backoff_max: Duration::from_millis(
                toml_config
                    .accept
                    .backoff_max_ms
                    .unwrap_or(toml_config.accept.backoff_initial_ms),
            ),
            log_level: cli
                .log_level
                .clone()
                .unwrap_or(toml_config.logging.level),
        };

        if config.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket path must not be empty".into()));
        }
        if config.backlog <= 0 {
            return Err(ConfigError::Invalid(format!(
                "backlog must be positive, got {}",
                config.backlog
            )));
        }
        if config.backoff_max < config.backoff_initial {
            return Err(ConfigError::Invalid(
                "accept.backoff_max_ms must not be below accept.backoff_initial_ms".into(),
            ));
        }

        Ok(config)
    }

    pub fn accept_backoff(&self) -> AcceptBackoff {
        AcceptBackoff::new(self.backoff_initial, self.backoff_max)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
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
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["arq-server"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.socket_path, PathBuf::from("/tmp/arq_socket"));
        assert_eq!(config.server.backlog, 5);
        assert!(config.server.remove_stale);
        assert_eq!(config.accept.backoff_initial_ms, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            socket_path = "/run/arq.sock"
            backlog = 16
            remove_stale = false

            [accept]
            backoff_initial_ms = 10
            backoff_max_ms = 1000

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.socket_path, PathBuf::from("/run/arq.sock"));
        assert_eq!(config.server.backlog, 16);
        assert!(!config.server.remove_stale);
        assert_eq!(config.accept.backoff_initial_ms, 10);
        assert_eq!(config.accept.backoff_max_ms, Some(1000));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_merge_defaults() {
        let config = Config::merge(&cli(&[]), TomlConfig::default()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            socket_path = "/run/file.sock"
            backlog = 16
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let args = cli(&["--socket", "/run/cli.sock", "--log-level", "trace"]);
        let config = Config::merge(&args, toml_config).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/cli.sock"));
        assert_eq!(config.backlog, 16);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_backlog() {
        let result = Config::merge(&cli(&["--backlog", "0"]), TomlConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_backoff_bounds() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [accept]
            backoff_initial_ms = 100
            backoff_max_ms = 10
            "#,
        )
        .unwrap();
        let result = Config::merge(&cli(&[]), toml_config);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_backoff_max_defaults_to_initial() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [accept]
            backoff_initial_ms = 250
            "#,
        )
        .unwrap();
        let config = Config::merge(&cli(&[]), toml_config).unwrap();
        assert_eq!(config.backoff_initial, Duration::from_millis(250));
        assert_eq!(config.backoff_max, Duration::from_millis(250));

        let mut backoff = config.accept_backoff();
        assert_eq!(backoff.on_failure(), Duration::from_millis(250));
        assert_eq!(backoff.on_failure(), Duration::from_millis(250));
    }

    #[test]
    fn test_server_flags_after_subcommand() {
        let args = cli(&["serve", "--backlog", "3", "--remove-stale", "false"]);
        assert_eq!(args.command, Some(Command::Serve));

        let config = Config::merge(&args, TomlConfig::default()).unwrap();
        assert_eq!(config.backlog, 3);
        assert!(!config.remove_stale);

        let before = Config::merge(&cli(&["--backlog", "3", "serve"]), TomlConfig::default());
        assert_eq!(before.unwrap(), config);
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(cli(&[]).command, None);
        assert_eq!(cli(&["serve"]).command, Some(Command::Serve));
        assert_eq!(
            cli(&["send", "Init Connection"]).command,
            Some(Command::Send {
                message: "Init Connection".to_string()
            })
        );
    }
}
