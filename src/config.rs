//! Configuration file parser for ~/.config/feedpoll/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid poll interval of {0} hours: sub-hour polling is unsupported")]
    InvalidPollInterval(u64),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Command-line flags override whatever the file says.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hours to wait between polling cycles. Must be at least 1.
    pub poll_interval_hours: u64,

    /// Path to the subscription list. `None` = `~/.config/feedpoll/feeds`.
    pub feeds_file: Option<PathBuf>,

    /// Directory for output buffers. `None` = write to stdout/stderr.
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_hours: 1,
            feeds_file: None,
            output_dir: None,
        }
    }
}

impl Config {
    /// Config files above 1 MB are refused rather than parsed.
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 3] = ["poll_interval_hours", "feeds_file", "output_dir"];

    /// Reads `path`, falling back to defaults when the file is absent or blank.
    ///
    /// Keys this version does not know are logged and otherwise ignored.
    /// Loading does not validate; call [`Config::validate`] once command-line
    /// overrides are applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_capped(path, Self::MAX_FILE_SIZE)? else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        };
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Blank config file, using defaults");
            return Ok(Self::default());
        }

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown config key ignored"));

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::info!(
            path = %path.display(),
            poll_interval_hours = config.poll_interval_hours,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_hours < 1 {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_hours));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_hours.saturating_mul(3600))
    }
}

/// `Ok(None)` when the file does not exist.
fn read_capped(path: &Path, limit: u64) -> Result<Option<String>, ConfigError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    if len > limit {
        return Err(ConfigError::TooLarge(format!(
            "{} is {} bytes, limit is {}",
            path.display(),
            len,
            limit
        )));
    }

    let mut content = String::new();
    file.take(limit).read_to_string(&mut content)?;
    Ok(Some(content))
}

// ============================================================================
// Tests
// ============================================================================
