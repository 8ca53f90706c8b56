//! Configuration management for zeroscan.
//!
//! This module provides the configuration file format used by the
//! `zeroscan` binary:
//! - Loading from YAML files
//! - Environment variable overrides (`ZEROSCAN__*`)
//! - Validation of scan and logging settings

use crate::error::{ConfigError, Result, ZeroscanError};
use crate::resolve_options::ResolveOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::Level;

/// Root configuration.
///
/// # Examples
///
/// ```
/// use zeroscan_core::config::ScanConfig;
///
/// let config = ScanConfig::from_yaml("scan:\n  protocols: [_http._tcp.local.]\n").unwrap();
/// assert_eq!(config.scan.protocols.len(), 1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Default resolve options
    #[serde(default)]
    pub scan: ResolveOptions,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScanConfig {
    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `ZEROSCAN__SECTION__FIELD` environment variables over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("ZEROSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Protocols may be left empty here since the command line can supply
    /// them; the remaining scan options are checked once any are present.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.logging.parse_level()?;

        if !self.scan.protocols.is_empty() {
            self.scan.validate()?;
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ZeroscanError::from(ConfigError::invalid_value(
                "logging.level",
                format!("Invalid log level: {}", self.level),
            ))
        })
    }

    /// Renders an `EnvFilter`-style directive string, e.g. `info,mdns_sd=warn`.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();

        let mut directives = self.level.clone();
        for (module, level) in modules {
            directives.push_str(&format!(",{}={}", module, level));
        }
        directives
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
