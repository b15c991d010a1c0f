//! Engine configuration.
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:5000"
//!
//! [polling]
//! interval_ms = 5000
//! max_interval_ms = 60000
//! device_id = "vermilinks-esp32-a"
//!
//! [realtime]
//! enabled = true
//! url = "ws://localhost:5000/ws"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{DEFAULT_FETCH_TIMEOUT, DEFAULT_INTERVAL, DEFAULT_MAX_INTERVAL, MIN_INTERVAL, PollingPolicy};

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend settings.
    pub server: ServerConfig,
    /// Snapshot polling settings.
    pub polling: PollingConfig,
    /// Push channel settings.
    pub realtime: RealtimeConfig,
}

impl EngineConfig {
    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration and return all problems at once.
    ///
    /// # Example
    ///
    /// ```
    /// use vermilinks_core::EngineConfig;
    ///
    /// let config = EngineConfig::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.polling.validate());
        errors.extend(self.realtime.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// The polling policy described by this configuration.
    pub fn polling_policy(&self) -> PollingPolicy {
        let polling = &self.polling;
        let mut builder = PollingPolicy::builder()
            .interval(Duration::from_millis(polling.interval_ms))
            .max_interval(Duration::from_millis(polling.max_interval_ms))
            .immediate(polling.immediate)
            .fetch_timeout(Duration::from_millis(polling.fetch_timeout_ms));
        if let Some(ttl) = polling.cache_ttl_ms {
            builder = builder.cache_ttl(Duration::from_millis(ttl));
        }
        if let Some(device_id) = &polling.device_id {
            builder = builder.device_id(device_id.clone());
        }
        builder.build()
    }
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the VermiLinks backend.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let url = self.base_url.trim();

        if url.is_empty() {
            errors.push(ValidationError::new(
                "server.base_url",
                "base URL cannot be empty",
            ));
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::new(
                "server.base_url",
                format!("'{}' must start with http:// or https://", url),
            ));
        }

        errors
    }
}

/// Snapshot polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_interval_ms: u64,
    /// Cache TTL in milliseconds; derived from the interval when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_ms: Option<u64>,
    /// Device to poll and accept push events for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Fetch as soon as polling starts.
    pub immediate: bool,
    /// Per-fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
            max_interval_ms: DEFAULT_MAX_INTERVAL.as_millis() as u64,
            cache_ttl_ms: None,
            device_id: None,
            immediate: true,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
        }
    }
}

impl PollingConfig {
    /// Validate polling configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let min = MIN_INTERVAL.as_millis() as u64;

        if self.interval_ms < min {
            errors.push(ValidationError::new(
                "polling.interval_ms",
                format!(
                    "interval {} is too short (minimum {} ms)",
                    self.interval_ms, min
                ),
            ));
        }
        if self.max_interval_ms < self.interval_ms {
            errors.push(ValidationError::new(
                "polling.max_interval_ms",
                format!(
                    "max interval {} is shorter than interval {}",
                    self.max_interval_ms, self.interval_ms
                ),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "polling.fetch_timeout_ms",
                "fetch timeout must be > 0",
            ));
        }
        if let Some(device_id) = &self.device_id
            && device_id.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "polling.device_id",
                "device id cannot be empty string (omit it instead)",
            ));
        }

        errors
    }
}

/// Push channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Whether to connect to the push channel.
    pub enabled: bool,
    /// WebSocket URL of the push channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            reconnect_delay_ms: 3000,
        }
    }
}

impl RealtimeConfig {
    /// Reconnect delay as a duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Validate realtime configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.starts_with("ws://") => {
                errors.push(ValidationError::new(
                    "realtime.url",
                    format!("'{}' must start with ws://", url),
                ));
            }
            None if self.enabled => {
                errors.push(ValidationError::new(
                    "realtime.url",
                    "url is required when realtime is enabled",
                ));
            }
            _ => {}
        }
        if self.reconnect_delay_ms == 0 {
            errors.push(ValidationError::new(
                "realtime.reconnect_delay_ms",
                "reconnect delay must be > 0",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `polling.interval_ms`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vermilinks")
        .join("engine.toml")
}
