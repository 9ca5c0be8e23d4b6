//! Configuration file support for pumplog.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pumplog/config.toml`.
//! `ParseConfig` is the read-only view one parse runs with.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Pump-side settings the history does not carry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// IANA zone the pump clock is set to
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Abort on correlation invariant violations instead of skipping the record
    #[serde(default = "default_strict_correlation")]
    pub strict_correlation: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strict_correlation: default_strict_correlation(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_strict_correlation() -> bool {
    true
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_output_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir().join(".local/share"));
    base.join("pumplog")
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir().join(".config"));
        base.join("pumplog").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Parse settings with no capture instant
    pub fn parse_config(&self) -> ParseConfig {
        ParseConfig {
            timezone: self.device.timezone.clone(),
            now: None,
            strict_correlation: self.parser.strict_correlation,
        }
    }
}

/// Read-only settings for one parse
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseConfig {
    pub timezone: String,
    /// When the history was read from the pump
    pub now: Option<DateTime<Utc>>,
    pub strict_correlation: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Config::default().parse_config()
    }
}

impl ParseConfig {
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn lenient(mut self) -> Self {
        self.strict_correlation = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.timezone, "UTC");
        assert!(config.parser.strict_correlation);
        assert!(config.output.output_dir.ends_with("pumplog"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.device.timezone = "Europe/London".into();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.device.timezone, "Europe/London");
        assert_eq!(parsed.output.output_dir, config.output.output_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[parser]
strict_correlation = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.parser.strict_correlation);
        assert_eq!(config.device.timezone, "UTC"); // default
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pumplog/config.toml");

        let mut config = Config::default();
        config.device.timezone = "America/Denver".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.parse_config().timezone, "America/Denver");
    }

    #[test]
    fn test_parse_config_builders() {
        let now = DateTime::from_timestamp(1_527_000_000, 0).unwrap();
        let parse = ParseConfig::default()
            .with_timezone("Australia/Sydney")
            .with_now(now)
            .lenient();
        assert_eq!(parse.timezone, "Australia/Sydney");
        assert_eq!(parse.now, Some(now));
        assert!(!parse.strict_correlation);
    }
}
