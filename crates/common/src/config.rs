//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Queue configuration.
    pub queue: QueueConfig,
    /// Redis configuration, required by the `redis` queue driver.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Queue driver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Process-local bounded channels.
    Memory,
    /// Redis lists.
    Redis,
}

impl DriverKind {
    /// Name used in configuration files and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Which driver backs the queues.
    pub driver: DriverKind,
    /// Per-queue channel capacity for the in-memory driver.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// A message is dead-lettered once its retry count exceeds this.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Back-off after a transport error in the Redis driver, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Name of the default work queue.
    #[serde(default = "default_queue_name")]
    pub default_queue: String,
    /// Name of the dead-letter queue.
    #[serde(default = "default_dead_letter_queue_name")]
    pub dead_letter_queue: String,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL. A `redis-cluster://` URL selects cluster mode.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

const fn default_capacity() -> usize {
    100
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_dead_letter_queue_name() -> String {
    "dead_queue".to_string()
}

fn default_redis_prefix() -> String {
    "courier".to_string()
}

impl QueueConfig {
    /// Configuration for the given driver with every other field at its default.
    #[must_use]
    pub fn with_driver(driver: DriverKind) -> Self {
        Self {
            driver,
            capacity: default_capacity(),
            max_retries: default_max_retries(),
            error_backoff_ms: default_error_backoff_ms(),
            default_queue: default_queue_name(),
            dead_letter_queue: default_dead_letter_queue_name(),
        }
    }

    /// Back-off after a transport error.
    #[must_use]
    pub const fn error_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.error_backoff_ms)
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `COURIER_ENV`)
    /// 3. Environment variables with `COURIER_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an inline TOML document, without environment overrides.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let queue = &self.queue;

        if queue.capacity == 0 {
            return Err(config::ConfigError::Message(
                "queue.capacity must be greater than zero".to_string(),
            ));
        }
        if queue.default_queue.is_empty() || queue.dead_letter_queue.is_empty() {
            return Err(config::ConfigError::Message(
                "queue names must not be empty".to_string(),
            ));
        }
        if queue.default_queue == queue.dead_letter_queue {
            return Err(config::ConfigError::Message(
                "queue.default_queue and queue.dead_letter_queue must differ".to_string(),
            ));
        }
        if queue.driver == DriverKind::Redis && self.redis.is_none() {
            return Err(config::ConfigError::Message(
                "queue.driver = \"redis\" requires a [redis] section".to_string(),
            ));
        }

        Ok(())
    }
}
