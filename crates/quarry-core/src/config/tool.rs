//! Tool and parameter configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Configuration for one named tool, as written in the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Tool kind, e.g. `postgres-sql`, `mysql-execute-sql`, `sqlite-list-tables`.
    pub kind: String,

    /// Name of the source the tool runs against.
    pub source: String,

    /// Human-readable description shown to clients.
    #[serde(default)]
    pub description: String,

    /// SQL statement. May contain driver placeholders (`$1`, `?`) for bound
    /// parameters and `{{.name}}` placeholders for template parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,

    /// Parameters passed to the driver out-of-band, in placeholder order.
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,

    /// Parameters substituted into the statement text before execution.
    #[serde(default)]
    pub template_parameters: Vec<ParameterConfig>,

    /// Auth services of which at least one must validate before the tool runs.
    #[serde(default)]
    pub auth_required: Vec<String>,

    /// Forward the caller's `Authorization` bearer token instead of using
    /// configured auth services.
    #[serde(default, rename = "useClientOAuth")]
    pub use_client_oauth: bool,

    /// Per-invocation execution ceiling. Falls back to the source's `queryTimeout`.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// A single declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ParameterType,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_required")]
    pub required: bool,

    /// Value used when the caller omits the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Element type, for `array` parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemConfig>,

    /// Fill the value from a validated token claim instead of the caller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_services: Vec<AuthParamRef>,
}

/// Element description for array parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    #[serde(rename = "type")]
    pub kind: ParameterType,

    #[serde(default)]
    pub description: String,
}

/// Reference from a parameter to the claim that supplies its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParamRef {
    /// Auth service name.
    pub name: String,
    /// Claim field, e.g. `email` or `sub`.
    pub field: String,
}

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "number")]
    Float,
    #[serde(alias = "bool")]
    Boolean,
    Array,
}

impl ParameterType {
    /// JSON Schema type name.
    pub fn json_schema_type(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Float => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Float => "float",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
        };
        f.write_str(name)
    }
}

fn default_required() -> bool {
    true
}
