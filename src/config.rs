//! Client settings loaded from YAML
//!
//! ```yaml
//! server_url: ws://localhost:5002
//! request_timeout_secs: 60
//! max_attempts: 3
//! reconnect:
//!   initial_delay_ms: 1000
//!   max_delay_ms: 5000
//! log_level: info
//! ```

use insight_socket::{states::HasTransport, ClientBuilder, ExponentialBackoff, InsightClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Overrides `server_url` when set
pub const SOCKET_URL_ENV: &str = "INSIGHT_SOCKET_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for one insight client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// WebSocket endpoint of the analysis backend
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Response window per attempt
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total sends per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// None = keep trying forever
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: None,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            reconnect: ReconnectSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl ClientSettings {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut settings: ClientSettings = serde_yaml::from_str(&yaml_content)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `config_path` if it exists, otherwise start from defaults
    pub fn load_or_default(config_path: impl AsRef<Path>) -> Result<Self> {
        if config_path.as_ref().exists() {
            return Self::load(config_path);
        }

        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(SOCKET_URL_ENV) {
            info!("Overriding server URL from environment variable");
            self.server_url = url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "server_url must start with ws:// or wss://, got '{}'",
                self.server_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "reconnect.initial_delay_ms must not exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.initial_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.max_attempts,
        )
    }

    /// Client builder preloaded with these settings
    pub fn builder(&self) -> ClientBuilder<HasTransport> {
        InsightClient::builder()
            .url(self.server_url.clone())
            .request_timeout(self.request_timeout())
            .max_attempts(self.max_attempts)
            .reconnect_strategy(self.reconnect_strategy())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Server URL: {}", self.server_url);
        info!("  Request timeout: {} seconds", self.request_timeout_secs);
        info!("  Max attempts: {}", self.max_attempts);
        info!(
            "  Reconnect delay: {}ms..{}ms ({})",
            self.reconnect.initial_delay_ms,
            self.reconnect.max_delay_ms,
            self.reconnect
                .max_attempts
                .map_or_else(|| "unlimited".to_string(), |n| format!("{} attempts", n))
        );
        info!("  Log level: {}", self.log_level);
    }
}

fn default_server_url() -> String {
    "ws://localhost:5002".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}
