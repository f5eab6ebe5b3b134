//! Configuration for typioca.
//!
//! Settings are read from `~/.typioca/config.toml`; command line flags take
//! precedence over the file.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 2229
//! key = "/var/lib/typioca/host_key"
//! grace_period_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 2229;
/// Default host key path, relative to the working directory
pub const DEFAULT_HOST_KEY: &str = "typioca";
/// Default time sessions get to finish on shutdown
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Contents of the settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to listen on, empty for all
    pub bind: String,
    pub port: u16,
    /// Host key path; generated when missing
    pub key: PathBuf,
    pub grace_period_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: String::new(),
            port: DEFAULT_PORT,
            key: PathBuf::from(DEFAULT_HOST_KEY),
            grace_period_secs: DEFAULT_GRACE_PERIOD.as_secs(),
        }
    }
}

impl Settings {
    /// Load settings from the user's config file, falling back to defaults
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`. Missing files yield defaults; unreadable
    /// or invalid ones are logged and yield defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read config");
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Invalid config, using defaults");
                Self::default()
            }
        }
    }
}

/// Command line values that override the `[server]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub key: Option<PathBuf>,
    pub grace_period_secs: Option<u64>,
}

/// Immutable server configuration, shared read-only by every connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub host_key_path: PathBuf,
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::resolve(&ServerSettings::default(), ServerOverrides::default())
    }
}

impl ServerConfig {
    /// Merge file settings with command line overrides
    pub fn resolve(settings: &ServerSettings, overrides: ServerOverrides) -> Self {
        Self {
            bind: overrides.bind.unwrap_or_else(|| settings.bind.clone()),
            port: overrides.port.unwrap_or(settings.port),
            host_key_path: overrides.key.unwrap_or_else(|| settings.key.clone()),
            grace_period: Duration::from_secs(
                overrides.grace_period_secs.unwrap_or(settings.grace_period_secs),
            ),
        }
    }

    /// Socket address to bind; an empty host means all interfaces
    pub fn address(&self) -> String {
        let host = if self.bind.is_empty() { "0.0.0.0" } else { &self.bind };
        format!("{}:{}", host, self.port)
    }
}

/// `~/.typioca`, where settings and local logs live
pub fn data_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".typioca"))
}

fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "");
        assert_eq!(config.port, 2229);
        assert_eq!(config.host_key_path, PathBuf::from("typioca"));
        assert_eq!(config.grace_period, Duration::from_secs(30));
        assert_eq!(config.address(), "0.0.0.0:2229");
    }

    #[test]
    fn test_partial_file() {
        let settings: Settings = toml::from_str("[server]\nport = 2300\n").unwrap();
        assert_eq!(settings.server.port, 2300);
        assert_eq!(settings.server.bind, "");
        assert_eq!(settings.server.grace_period_secs, 30);

        let empty: Settings = toml::from_str("").unwrap();
        assert_eq!(empty, Settings::default());
    }

    #[test]
    fn test_overrides_win() {
        let settings = ServerSettings {
            bind: "10.0.0.1".to_string(),
            port: 2300,
            ..Default::default()
        };
        let config = ServerConfig::resolve(
            &settings,
            ServerOverrides {
                port: Some(2400),
                grace_period_secs: Some(5),
                ..Default::default()
            },
        );
        assert_eq!(config.address(), "10.0.0.1:2400");
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.host_key_path, PathBuf::from("typioca"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Settings::load_from(&path), Settings::default());

        fs::write(&path, "[server]\nbind = \"127.0.0.1\"\nkey = \"/tmp/key\"\n").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.server.bind, "127.0.0.1");
        assert_eq!(settings.server.key, PathBuf::from("/tmp/key"));

        fs::write(&path, "[server\nport = ").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
