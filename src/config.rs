//! Configuration system
//!
//! Provides configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use crate::query::{DEFAULT_CURRENCY, DEFAULT_DECIMAL_PLACES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound accepted by `rust_decimal` for a scale.
const MAX_DECIMAL_PLACES: u32 = 28;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Report defaults
    pub report: ReportConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Currency used when a query does not name one
    pub default_currency: String,
    /// Scale measures are rounded to before they are returned
    pub decimal_places: u32,
    /// TOML rate table replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            decimal_places: DEFAULT_DECIMAL_PLACES,
            rates_file: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            PathBuf::from("cost-report.toml"),
            PathBuf::from(".cost-report.toml"),
            dirs::config_dir()
                .map(|d| d.join("cost-report").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("COST_REPORT_CURRENCY") {
            self.report.default_currency = val.to_ascii_uppercase();
        }
        if let Ok(val) = env::var("COST_REPORT_DECIMAL_PLACES") {
            self.report.decimal_places = val
                .parse()
                .context("Invalid COST_REPORT_DECIMAL_PLACES")?;
        }
        if let Ok(val) = env::var("COST_REPORT_RATES_FILE") {
            self.report.rates_file = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("COST_REPORT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let currency = &self.report.default_currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(anyhow::anyhow!(
                "Default currency must be a 3-letter uppercase code, got {:?}",
                currency
            ));
        }

        if self.report.decimal_places > MAX_DECIMAL_PLACES {
            return Err(anyhow::anyhow!(
                "Decimal places must be at most {}, got {}",
                MAX_DECIMAL_PLACES,
                self.report.decimal_places
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(anyhow::anyhow!(
                "Log format must be pretty or json, got {}",
                self.logging.format
            ));
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            return Err(anyhow::anyhow!(
                "Log output must be console, file or both, got {}",
                self.logging.output
            ));
        }

        if let Some(rates_file) = &self.report.rates_file {
            if !rates_file.is_file() {
                return Err(anyhow::anyhow!(
                    "Rates file does not exist: {}",
                    rates_file.display()
                ));
            }
        }

        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.report.default_currency, "USD");
        assert_eq!(config.report.decimal_places, 15);
        assert!(config.report.rates_file.is_none());
    }

    #[test]
    fn test_env_override() {
        env::set_var("COST_REPORT_DECIMAL_PLACES", "4");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.report.decimal_places, 4);
        env::remove_var("COST_REPORT_DECIMAL_PLACES");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.report.default_currency = "dollars".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.report.decimal_places = 40;
        assert!(config.validate().is_err());
    }
}
