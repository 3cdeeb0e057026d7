//! Configuration handling for the Qryptic client
//!
//! Settings live in a TOML file; every section falls back to its defaults
//! when absent so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session store location (defaults to `~/.qryptic/session.json`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    pub controller: ControllerSettings,
    pub sso: SsoSettings,
    pub tunnel: TunnelSettings,
    pub credentials: CredentialSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Path prefix in front of every API route
    pub api_prefix: String,
    /// Identity provider segment of the SSO routes
    pub sso_provider: String,
    pub request_timeout_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            api_prefix: "/api/v1".to_string(),
            sso_provider: "google".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoSettings {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl SsoSettings {
    /// Clamped to at least one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SsoSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Directory for the rendered engine config (platform default if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    pub interface: String,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            config_dir: None,
            interface: "wg0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Credentials expiring sooner than this are fetched again
    pub refetch_gap_minutes: i64,
}

impl CredentialSettings {
    pub fn refetch_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.refetch_gap_minutes)
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            refetch_gap_minutes: 30,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path`, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Settings file path (respects XDG_CONFIG_HOME and HOME)
    pub fn default_path() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("qryptic").join("config.toml");
        }

        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("qryptic")
                .join("config.toml");
        }

        if let Some(config) = dirs::config_dir() {
            return config.join("qryptic").join("config.toml");
        }

        PathBuf::from("qryptic.toml")
    }

    /// Session store path, honouring `store_path` when set
    pub fn store_path(&self) -> PathBuf {
        if let Some(ref path) = self.store_path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".qryptic")
            .join("session.json")
    }
}
