//! Configuration loading and typed config structures.
//!
//! The configuration lives in `railsync.yaml`. Every field has a default so
//! an empty (or missing) file yields a working local setup. Connection
//! targets can be overridden from the environment; the database password is
//! never stored in the file, only the name of the variable that holds it.

use std::path::Path;
use std::time::Duration;

use railsync_types::PollMode;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is present but unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Backing store connection target.
    #[serde(default)]
    pub store: StoreConfig,

    /// Poll and health-check cadence.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Observer HTTP bridge.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, and
    /// [`ConfigError::Invalid`] if an override or value is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// An empty string yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides looked up by variable name.
    ///
    /// Recognised variables: `RAILSYNC_DB_HOST`, `RAILSYNC_DB_PORT`,
    /// `RAILSYNC_DB_NAME`, `RAILSYNC_DB_USER`, `RAILSYNC_POLL_MODE`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a port or poll mode override
    /// does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RAILSYNC_DB_HOST") {
            self.store.host = host;
        }
        if let Some(port) = lookup("RAILSYNC_DB_PORT") {
            self.store.port = port.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("RAILSYNC_DB_PORT={port}: {e}"),
            })?;
        }
        if let Some(database) = lookup("RAILSYNC_DB_NAME") {
            self.store.database = database;
        }
        if let Some(user) = lookup("RAILSYNC_DB_USER") {
            self.store.user = user;
        }
        if let Some(mode) = lookup("RAILSYNC_POLL_MODE") {
            self.polling.mode = mode.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("RAILSYNC_POLL_MODE: {e}"),
            })?;
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero health-check interval or
    /// a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.health_check_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "polling.health_check_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.store.connect_timeout_ms == 0 || self.store.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "store timeouts must be at least 1ms".to_owned(),
            });
        }
        Ok(())
    }
}

/// Backing store connection target.
///
/// The store is addressed by named fields rather than a URL so that the
/// secret can stay out of the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Name the connection is registered under (`application_name`).
    #[serde(default = "default_connection_name")]
    pub connection_name: String,

    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Login role.
    #[serde(default = "default_user")]
    pub user: String,

    /// Name of the environment variable holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Upper bound on a connection attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on any single query, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Create the tracked tables after connecting if they are missing.
    #[serde(default)]
    pub provision_schema: bool,

    /// Insert the demo rows into empty tables after provisioning.
    #[serde(default)]
    pub seed_when_empty: bool,
}

impl StoreConfig {
    /// Connection attempt timeout.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-query timeout.
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Resolve the password from the environment.
    ///
    /// Returns `None` when the variable named by `password_env` is unset.
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env).ok()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_name: default_connection_name(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password_env: default_password_env(),
            connect_timeout_ms: default_connect_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            provision_schema: false,
            seed_when_empty: false,
        }
    }
}

/// Poll and health-check cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollingConfig {
    /// Poll cadence preset at startup.
    #[serde(default)]
    pub mode: PollMode,

    /// Milliseconds between connection health checks.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
}

impl PollingConfig {
    /// Health-check interval.
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::default(),
            health_check_interval_ms: default_health_check_interval_ms(),
        }
    }
}

/// Observer HTTP bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether to start the observer server.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_connection_name() -> String {
    "railway_connection".to_owned()
}

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_owned()
}

fn default_user() -> String {
    "postgres".to_owned()
}

fn default_password_env() -> String {
    "RAILSYNC_DB_PASSWORD".to_owned()
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

const fn default_query_timeout_ms() -> u64 {
    2000
}

const fn default_health_check_interval_ms() -> u64 {
    5000
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
