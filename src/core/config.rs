//! Configuration management

use clap::Parser;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidProviders(String),

    #[error("Invalid lending configuration: {0}")]
    InvalidLending(String),

    #[error("Invalid notification configuration: {0}")]
    InvalidNotifications(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub lending: LendingConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_with_args(cli_args)
    }

    fn load_with_args(cli_args: CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;

        // Config file, when specified (medium priority)
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(
                    config_path.display().to_string(),
                ));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Environment variables (higher priority), prefixed with LEND_
        // and using __ for nesting. Example: LEND_SERVER__PORT=8080
        builder = builder.add_source(
            Environment::with_prefix("LEND")
                .separator("__")
                .try_parsing(true),
        );

        // CLI arguments (highest priority)
        if let Some(host) = &cli_args.host {
            builder = builder.set_override("server.host", host.clone())?;
        }
        if let Some(port) = cli_args.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let builder = ConfigBuilder::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.request_timeout", 30)?
            .set_default("database.path", "./data/lendkeeper.db")?
            .set_default("database.connection_pool_size", 10)?
            .set_default("database.busy_timeout", 5000)?
            .set_default("providers.http_timeout", 10)?
            .set_default("lending.due_period_days", 14)?
            .set_default("lending.remind_days_before", 1)?
            .set_default("lending.max_loans_per_user", 10)?
            .set_default("notifications.sweep_interval_hours", 24)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.output", "stdout")?;
        Ok(builder)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.providers.validate()?;
        self.lending.validate()?;
        self.notifications.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Command-line arguments for configuration override
#[derive(Debug, Parser)]
#[command(name = "lendkeeper")]
#[command(about = "Media lending ledger and reminder engine", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server host address
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database file path
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64, // seconds
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidServer("host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidServer("port must be greater than 0".to_string()));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidServer(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    pub busy_timeout: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabase("path cannot be empty".to_string()));
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase(
                "connection_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout == 0 {
            return Err(ConfigError::InvalidDatabase(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// API keys and OAuth secrets for the external catalogs.
///
/// Every secret is optional: a missing secret disables that provider
/// without preventing startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    /// Outbound HTTP timeout in seconds
    pub http_timeout: u64,
    #[serde(default)]
    pub google_books_api_key: Option<String>,
    #[serde(default)]
    pub tmdb_api_key: Option<String>,
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,
    #[serde(default)]
    pub igdb_client_id: Option<String>,
    #[serde(default)]
    pub igdb_client_secret: Option<String>,
    #[serde(default)]
    pub board_game_atlas_client_id: Option<String>,
    #[serde(default)]
    pub comic_vine_api_key: Option<String>,
}

impl ProvidersConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout == 0 {
            return Err(ConfigError::InvalidProviders(
                "http_timeout must be greater than 0".to_string(),
            ));
        }

        // Secrets come in pairs for the OAuth providers
        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            return Err(ConfigError::InvalidProviders(
                "spotify_client_id and spotify_client_secret must be set together".to_string(),
            ));
        }
        if self.igdb_client_id.is_some() != self.igdb_client_secret.is_some() {
            return Err(ConfigError::InvalidProviders(
                "igdb_client_id and igdb_client_secret must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LendingConfig {
    /// Loan length in days; due date = borrow day + this
    pub due_period_days: i64,
    /// Days before the due date at which a loan becomes reminder-eligible
    pub remind_days_before: i64,
    /// Maximum concurrent loans per user, enforced before any ledger write
    pub max_loans_per_user: usize,
}

impl LendingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.due_period_days <= 0 {
            return Err(ConfigError::InvalidLending(
                "due_period_days must be greater than 0".to_string(),
            ));
        }

        if self.remind_days_before < 0 {
            return Err(ConfigError::InvalidLending(
                "remind_days_before cannot be negative".to_string(),
            ));
        }

        if self.max_loans_per_user == 0 {
            return Err(ConfigError::InvalidLending(
                "max_loans_per_user must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Reminder sweep period in hours
    pub sweep_interval_hours: u64,
    /// Delivery endpoint for reminder messages; absent means log-only delivery
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl NotificationsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_hours == 0 {
            return Err(ConfigError::InvalidNotifications(
                "sweep_interval_hours must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.webhook_url {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::InvalidNotifications(format!(
                    "webhook_url is not a valid URL: {}",
                    url
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        Config::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = defaults();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.lending.due_period_days, 14);
        assert_eq!(config.lending.remind_days_before, 1);
        assert_eq!(config.lending.max_loans_per_user, 10);
        assert_eq!(config.notifications.sweep_interval_hours, 24);
        assert!(config.providers.spotify_client_id.is_none());
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = defaults();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidServer(_))
        ));
    }

    #[test]
    fn test_lending_config_validation() {
        let mut config = defaults();
        config.lending.due_period_days = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLending(_))
        ));

        let mut config = defaults();
        config.lending.max_loans_per_user = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLending(_))
        ));
    }

    #[test]
    fn test_oauth_secrets_must_pair() {
        let mut config = defaults();
        config.providers.spotify_client_id = Some("id".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProviders(_))
        ));

        config.providers.spotify_client_secret = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_url_validation() {
        let mut config = defaults();
        config.notifications.webhook_url = Some("not a url".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNotifications(_))
        ));

        config.notifications.webhook_url = Some("https://example.com/notify".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = defaults();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogging(_))
        ));

        let mut config = defaults();
        config.logging.output = "file".to_string();
        config.logging.log_file = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogging(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/lendkeeper.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
