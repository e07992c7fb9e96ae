// src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Core settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Default backup destination directory; the CLI positional always wins.
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

/// Disk-space admission-control settings. The buffer and threshold values
/// are tunable defaults, not hard invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Safety buffer applied to plain-copy estimates.
    #[serde(default = "default_copy_buffer")]
    pub copy_buffer: f64,

    /// Safety buffer applied to archive estimates (staging overhead).
    #[serde(default = "default_archive_buffer")]
    pub archive_buffer: f64,

    /// Free-space percentage below which the strict policy asks for
    /// confirmation.
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,

    /// Free-space percentage below which the strict policy refuses outright.
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,

    /// Enable the percentage-threshold policy by default.
    #[serde(default)]
    pub strict: bool,
}

fn default_copy_buffer() -> f64 {
    crate::space::DEFAULT_COPY_BUFFER
}
fn default_archive_buffer() -> f64 {
    crate::space::DEFAULT_ARCHIVE_BUFFER
}
fn default_warning_percent() -> f64 {
    20.0
}
fn default_critical_percent() -> f64 {
    10.0
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            copy_buffer: default_copy_buffer(),
            archive_buffer: default_archive_buffer(),
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub space: SpaceConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found")]
    NotFound,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Config {
    /// Loads configuration from the standard search paths or an explicit
    /// file.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        for path in get_config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "loading config");
                return Self::load_from_file(&path);
            }
        }

        Err(ConfigError::NotFound)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.space.copy_buffer < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "copy_buffer must be at least 1.0, got {}",
                self.space.copy_buffer
            )));
        }

        if self.space.archive_buffer < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "archive_buffer must be at least 1.0, got {}",
                self.space.archive_buffer
            )));
        }

        for (name, value) in [
            ("warning_percent", self.space.warning_percent),
            ("critical_percent", self.space.critical_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        if self.space.critical_percent >= self.space.warning_percent {
            return Err(ConfigError::Invalid(format!(
                "critical_percent ({}) must be below warning_percent ({})",
                self.space.critical_percent, self.space.warning_percent
            )));
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }
}

/// Search order: explicit path, system config, user config, working
/// directory.
fn get_config_paths(custom_path: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(path) = custom_path {
        paths.push(path.to_path_buf());
    }

    paths.push(PathBuf::from("/etc/timevault/config.toml"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("timevault/config.toml"));
    }

    paths.push(PathBuf::from("timevault.toml"));

    paths
}
