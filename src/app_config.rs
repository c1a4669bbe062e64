//! Application configuration.
//!
//! Settings may come from a TOML file; command-line flags override file
//! values. Without a file, everything has a sensible default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use exec_fs::entry::RefreshPolicy;

fn runtime_dir() -> Option<PathBuf> {
    if let Some(path) = dirs::runtime_dir() {
        return Some(path.join("exec-fs"));
    }

    dirs::home_dir().map(|path| path.join(".local").join("share").join("exec-fs"))
}

fn default_mount_point() -> PathBuf {
    runtime_dir().map_or_else(|| PathBuf::from("/tmp/exec-fs/mnt"), |rd| rd.join("mnt"))
}

fn default_pid_file() -> PathBuf {
    runtime_dir().map_or_else(
        || PathBuf::from("/var/run/exec-fs.pid"),
        |rd| rd.join("exec-fs.pid"),
    )
}

fn default_cache_dir() -> String {
    "cached".to_owned()
}

fn default_min_refresh_ms() -> u64 {
    500
}

fn default_max_refresh_ms() -> u64 {
    3500
}

/// Refresh backoff bounds, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RefreshConfig {
    #[serde(default = "default_min_refresh_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_max_refresh_ms")]
    pub max_interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_refresh_ms(),
            max_interval_ms: default_max_refresh_ms(),
        }
    }
}

impl From<&RefreshConfig> for RefreshPolicy {
    fn from(c: &RefreshConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(c.min_interval_ms),
            max_interval: Duration::from_millis(c.max_interval_ms),
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The mount point for the filesystem.
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// Name of the caching subtree directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Report placeholder attributes for unknown paths instead of executing
    /// commands on stat.
    #[serde(default)]
    pub unsafe_attrs: bool,

    /// Diagnostic mode: entries contain their own command text.
    #[serde(default)]
    pub echo: bool,

    /// Working directory for command execution.
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub refresh: RefreshConfig,

    /// The path to the PID file used when running as a daemon.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_point: default_mount_point(),
            cache_dir: default_cache_dir(),
            unsafe_attrs: false,
            echo: false,
            workdir: None,
            refresh: RefreshConfig::default(),
            pid_file: default_pid_file(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pid_file.parent().is_none() {
            errors.push(format!(
                "PID file path '{}' has no parent directory.",
                self.pid_file.display()
            ));
        }

        if self.cache_dir.trim_matches('/').is_empty() {
            errors.push("Cache directory name must not be empty.".to_owned());
        }

        if self.cache_dir.trim_matches('/').contains('/') {
            errors.push(format!(
                "Cache directory name '{}' must be a single path segment.",
                self.cache_dir
            ));
        }

        if self.refresh.min_interval_ms > self.refresh.max_interval_ms {
            errors.push(format!(
                "Refresh min interval ({} ms) exceeds max interval ({} ms).",
                self.refresh.min_interval_ms, self.refresh.max_interval_ms
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Returns config file paths in descending priority order.
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("exec-fs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("exec-fs").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/exec-fs/config.toml"));

        paths
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, the external
    /// path if given, or defaults when no file exists.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = external_config_path {
            Self::load_from_file(path)?
        } else if let Some(path) = Self::config_search_paths().into_iter().find(|p| p.exists()) {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        if let Err(validation_errors) = config.validate() {
            return Err(ConfigError::ValidationErrors(validation_errors));
        }
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn nested_cache_dir_is_rejected() {
        let config = Config {
            cache_dir: "a/b".to_owned(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_refresh_bounds_are_rejected() {
        let config = Config {
            refresh: RefreshConfig {
                min_interval_ms: 5000,
                max_interval_ms: 100,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimal_toml_round_trips_with_defaults() {
        let config: Config = toml::from_str("echo = true").unwrap();
        assert!(config.echo);
        assert_eq!(config.cache_dir, "cached");
        assert_eq!(config.refresh.min_interval_ms, 500);
    }
}
