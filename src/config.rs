//! Dashboard settings
//!
//! Defaults, then `settings.json` from the platform config directory (or an
//! explicit path), then `COSTBOARD_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::aggregation::{OwnerResolver, DEFAULT_OWNER_PATTERN};

pub const APP_DIR_NAME: &str = "CostBoard";
const SETTINGS_FILENAME: &str = "settings.json";

pub const ENV_BASE_URL: &str = "COSTBOARD_BASE_URL";
pub const ENV_WINDOW: &str = "COSTBOARD_WINDOW";
pub const ENV_TIMEOUT_SECS: &str = "COSTBOARD_TIMEOUT_SECS";
pub const ENV_OWNER_PATTERN: &str = "COSTBOARD_OWNER_PATTERN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid base URL '{0}': must be an absolute http(s) URL")]
    InvalidBaseUrl(String),
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,
    #[error("Invalid owner pattern: {0}")]
    InvalidOwnerPattern(String),
}

/// Settings structure, stored as camelCase JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    pub base_url: String,
    pub default_window: String,
    pub request_timeout_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub owner_pattern: String,
    pub file_logging: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9991/getcost".to_string(),
            default_window: "24h".to_string(),
            request_timeout_seconds: 30,
            refresh_interval_seconds: 300,
            owner_pattern: DEFAULT_OWNER_PATTERN.to_string(),
            file_logging: false,
        }
    }
}

impl DashboardSettings {
    /// Resolve settings from disk and the process environment.
    ///
    /// A missing file at the default location is not an error; a missing
    /// file at an explicit path is.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match settings_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env_with(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Apply `COSTBOARD_*` overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|raw| clean_value(&raw)).filter(|v| !v.is_empty());

        if let Some(url) = read(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(window) = read(ENV_WINDOW) {
            self.default_window = window;
        }
        if let Some(raw) = read(ENV_TIMEOUT_SECS) {
            self.request_timeout_seconds =
                raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS,
                    value: raw.clone(),
                })?;
        }
        if let Some(pattern) = read(ENV_OWNER_PATTERN) {
            self.owner_pattern = pattern;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.owner_resolver()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ConfigError::InvalidBaseUrl(self.base_url.clone())),
        }
    }

    pub fn owner_resolver(&self) -> Result<OwnerResolver, ConfigError> {
        OwnerResolver::new(&self.owner_pattern)
            .map_err(|err| ConfigError::InvalidOwnerPattern(err.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILENAME))
}

/// Trim whitespace and one layer of surrounding quotes.
fn clean_value(raw: &str) -> String {
    let mut value = raw.trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }

    value.trim().to_string()
}
