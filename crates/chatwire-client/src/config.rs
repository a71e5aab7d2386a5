//! Client configuration.
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! channel_url = "wss://chat.example.com/ws/chat"
//! api_url = "https://chat.example.com/api"
//! heartbeat_interval_ms = 30000
//!
//! [reconnect]
//! max_attempts = 8
//! ```
//!
//! `CHATWIRE_WS_URL`, `CHATWIRE_API_URL` and `CHATWIRE_API_TIMEOUT_MS` override
//! the file when [`ClientConfig::with_env_overrides`] is applied.

use chatwire_core::Backoff;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_WS_URL: &str = "CHATWIRE_WS_URL";
pub const ENV_API_URL: &str = "CHATWIRE_API_URL";
pub const ENV_API_TIMEOUT_MS: &str = "CHATWIRE_API_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint; the session token is added as `?token=`.
    pub channel_url: String,
    /// Base URL of the request/response API used for fallback and polling.
    pub api_url: String,
    pub api_timeout_ms: u64,
    /// How long an opening channel may stay in `connecting`.
    pub open_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// How long a send waits for a `connecting` channel before falling back.
    pub connect_grace_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_url: "ws://localhost:8080/ws/chat".to_string(),
            api_url: "http://localhost:8080/api".to_string(),
            api_timeout_ms: 10_000,
            open_timeout_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            connect_grace_ms: 500,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            base_delay_ms: backoff.base_delay.as_millis() as u64,
            growth_factor: backoff.growth_factor,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
            max_attempts: backoff.max_attempts,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHATWIRE_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(ENV_WS_URL) {
            self.channel_url = url;
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(timeout) = lookup(ENV_API_TIMEOUT_MS) {
            self.api_timeout_ms = timeout.trim().parse().map_err(|e| ConfigError::Invalid {
                field: ENV_API_TIMEOUT_MS,
                reason: format!("{e}"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let channel = self.channel_endpoint()?;
        if !matches!(channel.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid {
                field: "channel_url",
                reason: format!("expected ws:// or wss://, got {}://", channel.scheme()),
            });
        }
        let api = self.api_endpoint()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_url",
                reason: format!("expected http:// or https://, got {}://", api.scheme()),
            });
        }

        for (field, value) in [
            ("api_timeout_ms", self.api_timeout_ms),
            ("open_timeout_ms", self.open_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
            ("reconnect.max_delay_ms", self.reconnect.max_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        // NaN fails this too.
        if !(self.reconnect.growth_factor > 1.0 && self.reconnect.growth_factor.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "reconnect.growth_factor",
                reason: format!("must be a finite number above 1, got {}", self.reconnect.growth_factor),
            });
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::Invalid {
                field: "reconnect.max_delay_ms",
                reason: "must not be below base_delay_ms".to_string(),
            });
        }
        Ok(())
    }

    pub fn channel_endpoint(&self) -> Result<Url, ConfigError> {
        parse_url("channel_url", &self.channel_url)
    }

    pub fn api_endpoint(&self) -> Result<Url, ConfigError> {
        parse_url("api_url", &self.api_url)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_grace(&self) -> Duration {
        Duration::from_millis(self.connect_grace_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            growth_factor: self.reconnect.growth_factor,
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
        }
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
