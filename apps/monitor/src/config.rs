//! Monitor configuration management.
//!
//! Read from `config.json` under the per-user config directory:
//! - Linux:   `~/.config/bioreactor-monitor/config.json`
//! - Windows: `%APPDATA%\bioreactor-monitor\config.json`
//!
//! `BIOREACTOR_WS_URL` overrides the address from the file. When the file
//! does not exist yet the monitor writes the defaults there on startup (see
//! [`MonitorConfig::write_default_if_missing`]) so they can be edited.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bioreactor_link::{DEFAULT_RECONNECT_DELAY, DEFAULT_URL, LinkConfig};
use bioreactor_protocol::ClientType;

/// Environment variable overriding the backend address.
pub const URL_ENV: &str = "BIOREACTOR_WS_URL";

/// Errors while reading or writing the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Backend WebSocket address.
    pub url: String,

    /// Seconds to wait before reconnecting after a close.
    pub reconnect_delay_secs: u64,

    /// Kind announced to the backend.
    pub client_type: ClientType,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.into(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY.as_secs(),
            client_type: ClientType::Frontend,
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or unparseable, then applies the environment override.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_url_override(std::env::var(URL_ENV).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Replaces the URL with `value` when it is set and non-empty.
    pub fn apply_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|u| !u.trim().is_empty()) {
            self.url = url.trim().to_string();
        }
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Writes the default configuration to `path` unless a file is already
    /// there. Returns whether a file was written.
    pub fn write_default_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        Ok(true)
    }

    /// Link settings derived from this configuration.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            url: self.url.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs.max(1)),
            client_type: self.client_type,
        }
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    config_base_dir()
        .join("bioreactor-monitor")
        .join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
