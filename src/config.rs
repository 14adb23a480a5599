//! Configuration for the biosensor monitor.

use crate::core::{TimeWindow, Zone, DRUNK_THRESHOLD};
use crate::source::http::DEFAULT_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Period between scheduled fetches
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    /// Level at or above which an alert is raised
    pub threshold: f64,

    /// Windows the presentation may select from
    pub windows: Vec<TimeWindow>,

    /// Window selected at startup
    pub default_window: TimeWindow,

    /// Where readings come from
    pub source: SourceConfig,

    /// Where alerts go
    pub notifier: NotifierConfig,

    /// IANA timezone for day bucketing and labels (device local time if unset)
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            threshold: DRUNK_THRESHOLD,
            windows: TimeWindow::ALL.to_vec(),
            default_window: TimeWindow::Last24h,
            source: SourceConfig::default(),
            notifier: NotifierConfig::default(),
            timezone: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biosensor-monitor")
            .join("config.json")
    }

    /// Check that the configuration can drive a monitor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.windows.is_empty() {
            return Err(ConfigError::Invalid("at least one time window is required".into()));
        }
        if !self.windows.contains(&self.default_window) {
            return Err(ConfigError::Invalid(format!(
                "default window {} is not among the selectable windows",
                self.default_window
            )));
        }
        self.zone()?;
        Ok(())
    }

    /// Display timezone.
    pub fn zone(&self) -> Result<Zone, ConfigError> {
        match &self.timezone {
            Some(name) => Zone::parse(name).map_err(ConfigError::Invalid),
            None => Ok(Zone::Local),
        }
    }
}

/// Configuration for the reading source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Fetch the data document over HTTP
    Http { url: String, timeout_secs: u64 },
    /// Read the data document from a local file
    File { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Http {
            url: DEFAULT_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Configuration for alert delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// POST alerts as JSON to this URL in addition to logging them
    pub webhook_url: Option<String>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
