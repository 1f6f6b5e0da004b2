// SPDX-License-Identifier: MIT OR Apache-2.0
//! Daemon configuration loading and validation.

use convd_convert::{Converter, EngineConverter, MockConverter};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level daemon configuration (`convertd.toml`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Cache directory; omit to disable caching.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Converter selection.
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cache_dir: None,
            converter: ConverterConfig::default(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8008".to_string()
}

/// Configuration for the converter backing both frontends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConverterConfig {
    /// External headless office engine.
    Engine {
        /// Engine binary.
        #[serde(default = "default_engine_command")]
        command: String,
    },
    /// Deterministic converter for engine-less setups.
    Mock,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self::Engine {
            command: default_engine_command(),
        }
    }
}

fn default_engine_command() -> String {
    "soffice".to_string()
}

impl ConverterConfig {
    /// Instantiate the configured converter.
    pub fn build(&self) -> Arc<dyn Converter> {
        match self {
            Self::Engine { command } => Arc::new(EngineConverter::new(command)),
            Self::Mock => Arc::new(MockConverter),
        }
    }
}

/// Errors found during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBind { value: String },
    EmptyEngineCommand,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBind { value } => {
                write!(f, "invalid bind address '{value}'")
            }
            ConfigError::EmptyEngineCommand => {
                write!(f, "engine converter command must not be empty")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and parse a TOML configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    let config: DaemonConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))?;
    Ok(config)
}

/// Validate a parsed configuration, returning any semantic errors found.
pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.bind.parse::<SocketAddr>().is_err() {
        errors.push(ConfigError::InvalidBind {
            value: config.bind.clone(),
        });
    }
    if let ConverterConfig::Engine { command } = &config.converter
        && command.trim().is_empty()
    {
        errors.push(ConfigError::EmptyEngineCommand);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_locally_without_cache() {
        let config = DaemonConfig::default();
        assert_eq!(config.bind, "127.0.0.1:8008");
        assert!(config.cache_dir.is_none());
        validate_config(&config).unwrap();
    }

    #[test]
    fn parse_full_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:9090"
            cache_dir = "/var/cache/convertd"

            [converter]
            type = "engine"
            command = "libreoffice"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9090");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/convertd")));
        assert!(matches!(
            config.converter,
            ConverterConfig::Engine { ref command } if command == "libreoffice"
        ));
        validate_config(&config).unwrap();
    }

    #[test]
    fn parse_mock_converter() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [converter]
            type = "mock"
            "#,
        )
        .unwrap();
        assert!(matches!(config.converter, ConverterConfig::Mock));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<DaemonConfig>("no_such_field = 1").is_err());
    }

    #[test]
    fn invalid_bind_is_flagged() {
        let config = DaemonConfig {
            bind: "not-an-address".to_string(),
            ..DaemonConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ConfigError::InvalidBind { .. }));
    }

    #[test]
    fn empty_engine_command_is_flagged() {
        let config = DaemonConfig {
            converter: ConverterConfig::Engine {
                command: "  ".to_string(),
            },
            ..DaemonConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ConfigError::EmptyEngineCommand));
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::InvalidBind {
            value: "x".to_string(),
        };
        assert_eq!(e.to_string(), "invalid bind address 'x'");
        assert!(ConfigError::EmptyEngineCommand.to_string().contains("engine"));
    }
}
