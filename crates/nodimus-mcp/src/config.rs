//! Configuration
//!
//! Reads `config.toml`, then applies environment overrides. Precedence:
//! environment > file > defaults. A missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub snapshot: SnapshotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory; a leading `~` expands to the home directory
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.nodimus".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub interval_hours: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Resolve the config path: explicit path > NODIMUS_CONFIG env > platform config dir
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("NODIMUS_CONFIG") {
            return PathBuf::from(p);
        }
        ProjectDirs::from("com", "nodimus", "nodimus")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Load the config from disk, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(path = %config_path.display(), "Loading configuration");
            let raw = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;
            toml::from_str::<Config>(&raw).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?
        } else {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            Config::default()
        };

        let config = config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply NODIMUS_* overrides from `lookup`
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NODIMUS_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Some(v) = lookup("NODIMUS_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("NODIMUS_SNAPSHOT_INTERVAL_HOURS") {
            match v.parse::<u64>() {
                Ok(hours) => self.snapshot.interval_hours = hours,
                Err(_) => warn!("Ignoring NODIMUS_SNAPSHOT_INTERVAL_HOURS={}: not a number", v),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.data_dir is empty".into()));
        }
        if self.snapshot.interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "snapshot.interval_hours must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        expand_home(&self.storage.data_dir, || {
            BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
        })
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot.interval_hours.saturating_mul(3600))
    }
}

fn expand_home<F>(raw: &str, home: F) -> Result<PathBuf, ConfigError>
where
    F: FnOnce() -> Option<PathBuf>,
{
    if raw == "~" {
        return home().ok_or(ConfigError::NoHomeDir);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(home().ok_or(ConfigError::NoHomeDir)?.join(rest));
    }
    Ok(PathBuf::from(raw))
}
