//! Configuration types for Quarry.
//!
//! The configuration file has four top-level sections:
//!
//! - **sources**: named database connections
//! - **authServices**: named OIDC token validators
//! - **tools**: named SQL tools bound to a source
//! - **toolsets**: named, ordered groups of tool names
//!
//! `${VAR}` / `${VAR:-default}` references are expanded from the environment
//! before the YAML is parsed.

pub mod auth;
pub mod env;
pub mod source;
pub mod tool;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use auth::{AuthServiceConfig, AuthServiceKind};
pub use source::{SourceConfig, SourceKind};
pub use tool::{AuthParamRef, ItemConfig, ParameterConfig, ParameterType, ToolConfig};

/// Complete Quarry configuration as parsed from one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarryConfig {
    /// Named data sources.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Named auth services.
    #[serde(default)]
    pub auth_services: BTreeMap<String, AuthServiceConfig>,

    /// Named tools.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,

    /// Named toolsets. Member order is preserved.
    #[serde(default)]
    pub toolsets: BTreeMap<String, Vec<String>>,
}

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable `{name}` is not set and has no default")]
    MissingEnv { name: String },

    #[error("unterminated `${{` reference in configuration")]
    UnterminatedEnv,

    #[error("invalid configuration at {location}: {message}")]
    Invalid { location: String, message: String },
}

impl ConfigError {
    /// Build a validation error for a location such as `tools.find-car`.
    pub fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl QuarryConfig {
    /// Load configuration from a YAML file, expanding environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content, expanding environment variables.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = env::expand_env(content)?;
        Self::from_expanded_yaml(&expanded)
    }

    /// Parse configuration with a custom variable lookup.
    pub fn from_yaml_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = env::expand_with(content, lookup)?;
        Self::from_expanded_yaml(&expanded)
    }

    fn from_expanded_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty file is a valid, empty configuration.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }
}
