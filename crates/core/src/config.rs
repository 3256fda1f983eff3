use crate::discovery::DEFAULT_SCOPE;
use crate::validation::FocusSpeedPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Process-wide gateway settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP API listens on
    pub bind_addr: SocketAddr,
    /// Port of the device-management service on each camera
    pub device_port: u16,
    /// Deadline for each device call, in seconds
    pub device_timeout_secs: u64,
    /// How long discovery listens for replies, in seconds
    pub discovery_timeout_secs: u64,
    /// Scope URI sent with discovery probes
    pub discovery_scope: String,
    pub focus_speed: FocusSpeedPolicy,
    /// Return the literal RTSP URI from set-profile instead of an acknowledgment
    pub echo_stream_uri: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            device_port: 80,
            device_timeout_secs: 10,
            discovery_timeout_secs: 5,
            discovery_scope: DEFAULT_SCOPE.to_string(),
            focus_speed: FocusSpeedPolicy::default(),
            echo_stream_uri: false,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_port == 0 {
            return Err(invalid("device_port", "must be non-zero"));
        }
        if self.device_timeout_secs == 0 {
            return Err(invalid("device_timeout_secs", "must be at least 1"));
        }
        if self.discovery_timeout_secs == 0 {
            return Err(invalid("discovery_timeout_secs", "must be at least 1"));
        }
        if self.discovery_scope.trim().is_empty() {
            return Err(invalid("discovery_scope", "must not be empty"));
        }
        if let FocusSpeedPolicy::Default(speed) = self.focus_speed {
            if !speed.is_finite() || !(-1.0..=1.0).contains(&speed) {
                return Err(invalid(
                    "focus_speed",
                    format!("default {} is outside [-1.0, 1.0]", speed),
                ));
            }
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
