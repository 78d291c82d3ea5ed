//! Validated tool definitions.
//!
//! A [`ToolDefinition`] is built once from a [`ToolConfig`] when the
//! registry loads and never changes afterwards. All structural checks
//! (kind, source, auth references, parameter namespaces, template
//! placeholders, defaults) happen here so that a loaded tool can always be
//! resolved without surprises.

use crate::protocol::ToolMeta;
use crate::source::list_tables_statement;
use crate::template::Template;
use quarry_auth::AuthRequirements;
use quarry_core::{
    AuthParamRef, AuthServiceConfig, ConfigError, ParameterConfig, ParameterType, SourceConfig,
    SourceKind, ToolConfig,
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Name of the implicit template parameter of `execute-sql` tools.
pub const EXECUTE_SQL_PARAM: &str = "sql";

/// Closed set of tool behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Configured statement with bound and template parameters.
    Sql,
    /// Caller-supplied SQL text.
    ExecuteSql,
    /// Lists the tables of the source.
    ListTables,
}

impl ToolKind {
    /// Parse a configured kind such as `postgres-sql` or `list-tables`.
    ///
    /// Returns the engine prefix, if any, alongside the kind.
    pub fn parse(kind: &str) -> Option<(Option<&str>, ToolKind)> {
        let suffixes = [
            ("execute-sql", ToolKind::ExecuteSql),
            ("list-tables", ToolKind::ListTables),
            ("sql", ToolKind::Sql),
        ];
        for (suffix, tool_kind) in suffixes {
            if kind == suffix {
                return Some((None, tool_kind));
            }
            if let Some(prefix) = kind.strip_suffix(suffix).and_then(|p| p.strip_suffix('-'))
                && !prefix.is_empty()
                && !prefix.contains('-')
            {
                return Some((Some(prefix), tool_kind));
            }
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Sql => "sql",
            ToolKind::ExecuteSql => "execute-sql",
            ToolKind::ListTables => "list-tables",
        }
    }
}

fn prefix_matches(prefix: &str, kind: SourceKind) -> bool {
    prefix == kind.scheme() || (kind == SourceKind::Mysql && prefix == "mariadb")
}

/// Declared parameter shared by the bound and template namespaces.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterType,
    /// Element type of array parameters. `None` accepts any scalar.
    pub item_kind: Option<ParameterType>,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParameterSpec {
    fn from_config(param: &ParameterConfig, location: &str) -> Result<Self, ConfigError> {
        if param.name.is_empty() {
            return Err(ConfigError::invalid(location, "parameter name must not be empty"));
        }
        let item_kind = match (&param.items, param.kind) {
            (None, _) => None,
            (Some(items), ParameterType::Array) if items.kind == ParameterType::Array => {
                return Err(ConfigError::invalid(
                    location,
                    format!("parameter `{}`: nested arrays are not supported", param.name),
                ));
            }
            (Some(items), ParameterType::Array) => Some(items.kind),
            (Some(_), _) => {
                return Err(ConfigError::invalid(
                    location,
                    format!("parameter `{}`: `items` is only valid for arrays", param.name),
                ));
            }
        };

        let spec = Self {
            name: param.name.clone(),
            kind: param.kind,
            item_kind,
            description: param.description.clone(),
            required: param.required,
            default: param.default.clone(),
        };

        if let Some(default) = &spec.default
            && !default.is_null()
        {
            spec.check(default).map_err(|reason| {
                ConfigError::invalid(
                    location,
                    format!("default of parameter `{}`: {}", spec.name, reason),
                )
            })?;
        }

        Ok(spec)
    }

    /// Type-check a non-null value, returning it in canonical form.
    ///
    /// Integers accept integral floats (`3.0` becomes `3`); floats accept
    /// integers; arrays check every element.
    pub fn check(&self, value: &Value) -> Result<Value, String> {
        match self.kind {
            ParameterType::Array => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected array, got {}", type_name(value)))?;
                let checked = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        check_scalar(self.item_kind, item)
                            .map_err(|reason| format!("element {}: {}", i, reason))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(checked))
            }
            kind => check_scalar(Some(kind), value),
        }
    }

    fn schema(&self, description: String) -> Value {
        let mut schema = json!({
            "type": self.kind.json_schema_type(),
            "description": description,
        });
        if self.kind == ParameterType::Array {
            schema["items"] = match self.item_kind {
                Some(kind) => json!({ "type": kind.json_schema_type() }),
                None => json!({}),
            };
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }

    /// Whether a caller must supply this parameter.
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

fn check_scalar(kind: Option<ParameterType>, value: &Value) -> Result<Value, String> {
    let mismatch = |expected: &str| format!("expected {}, got {}", expected, type_name(value));
    match kind {
        None => match value {
            Value::Array(_) | Value::Object(_) | Value::Null => Err(mismatch("scalar")),
            _ => Ok(value.clone()),
        },
        Some(ParameterType::String) => value
            .is_string()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("string")),
        Some(ParameterType::Boolean) => value
            .is_boolean()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("boolean")),
        Some(ParameterType::Float) => value
            .is_number()
            .then(|| value.clone())
            .ok_or_else(|| mismatch("float")),
        Some(ParameterType::Integer) => {
            if value.is_i64() {
                return Ok(value.clone());
            }
            if value.is_u64() {
                return Err("integer out of range".to_string());
            }
            match value.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(json!(f as i64))
                }
                _ => Err(mismatch("integer")),
            }
        }
        Some(ParameterType::Array) => Err(mismatch("scalar")),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter bound to a positional driver placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameterSpec {
    pub param: ParameterSpec,
    /// Claims that supply the value instead of the caller, tried in order.
    pub auth_sources: Vec<AuthParamRef>,
}

impl BoundParameterSpec {
    pub fn is_claim_filled(&self) -> bool {
        !self.auth_sources.is_empty()
    }
}

/// Parameter substituted into the statement text.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParameterSpec {
    pub param: ParameterSpec,
}

/// A fully validated tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub kind: ToolKind,
    pub source: String,
    pub description: String,
    pub parameters: Vec<BoundParameterSpec>,
    pub template_parameters: Vec<TemplateParameterSpec>,
    /// Statement text as configured (or implied by the kind).
    pub statement: String,
    pub template: Template,
    pub auth: AuthRequirements,
    /// Execution ceiling for one invocation.
    pub timeout: Duration,
}

impl ToolDefinition {
    /// Build and validate a tool against its source and the known auth services.
    pub fn from_config(
        name: &str,
        config: &ToolConfig,
        source: &SourceConfig,
        auth_services: &BTreeMap<String, AuthServiceConfig>,
    ) -> Result<Self, ConfigError> {
        let location = format!("tools.{}", name);
        let invalid = |message: String| ConfigError::invalid(location.clone(), message);

        let (prefix, kind) = ToolKind::parse(&config.kind)
            .ok_or_else(|| invalid(format!("unknown tool kind `{}`", config.kind)))?;
        if let Some(prefix) = prefix
            && !prefix_matches(prefix, source.kind)
        {
            return Err(invalid(format!(
                "kind `{}` cannot run against source `{}` of kind {}",
                config.kind, config.source, source.kind
            )));
        }

        for service in &config.auth_required {
            if !auth_services.contains_key(service) {
                return Err(invalid(format!("unknown auth service `{}` in authRequired", service)));
            }
        }
        if config.use_client_oauth && !config.auth_required.is_empty() {
            return Err(invalid(
                "authRequired and useClientOAuth are mutually exclusive".to_string(),
            ));
        }

        let mut parameters = Vec::with_capacity(config.parameters.len());
        let mut claim_services: Vec<String> = Vec::new();
        let mut bound_names = HashSet::new();
        for param in &config.parameters {
            if !bound_names.insert(param.name.as_str()) {
                return Err(invalid(format!("duplicate parameter `{}`", param.name)));
            }
            for source_ref in &param.auth_services {
                if !auth_services.contains_key(&source_ref.name) {
                    return Err(invalid(format!(
                        "parameter `{}` references unknown auth service `{}`",
                        param.name, source_ref.name
                    )));
                }
                if !claim_services.contains(&source_ref.name) {
                    claim_services.push(source_ref.name.clone());
                }
            }
            parameters.push(BoundParameterSpec {
                param: ParameterSpec::from_config(param, &location)?,
                auth_sources: param.auth_services.clone(),
            });
        }

        let mut template_parameters = Vec::with_capacity(config.template_parameters.len());
        let mut template_names = HashSet::new();
        for param in &config.template_parameters {
            if bound_names.contains(param.name.as_str()) {
                return Err(invalid(format!(
                    "`{}` is declared as both a parameter and a template parameter",
                    param.name
                )));
            }
            if !template_names.insert(param.name.as_str()) {
                return Err(invalid(format!("duplicate template parameter `{}`", param.name)));
            }
            if !param.auth_services.is_empty() {
                return Err(invalid(format!(
                    "template parameter `{}` cannot be filled from auth claims",
                    param.name
                )));
            }
            template_parameters.push(TemplateParameterSpec {
                param: ParameterSpec::from_config(param, &location)?,
            });
        }

        let statement = match kind {
            ToolKind::Sql => config
                .statement
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| invalid("a statement is required".to_string()))?,
            ToolKind::ExecuteSql => {
                if config.statement.is_some()
                    || !parameters.is_empty()
                    || !template_parameters.is_empty()
                {
                    return Err(invalid(format!(
                        "`{}` tools take the statement from the caller and declare no statement or parameters",
                        config.kind
                    )));
                }
                template_parameters.push(TemplateParameterSpec {
                    param: ParameterSpec {
                        name: EXECUTE_SQL_PARAM.to_string(),
                        kind: ParameterType::String,
                        item_kind: None,
                        description: "The SQL statement to execute.".to_string(),
                        required: true,
                        default: None,
                    },
                });
                format!("{{{{.{}}}}}", EXECUTE_SQL_PARAM)
            }
            ToolKind::ListTables => {
                if !parameters.is_empty() || !template_parameters.is_empty() {
                    return Err(invalid(format!("`{}` tools take no parameters", config.kind)));
                }
                config
                    .statement
                    .clone()
                    .unwrap_or_else(|| list_tables_statement(source.kind).to_string())
            }
        };

        let template = Template::parse(&statement).map_err(|e| invalid(e.to_string()))?;
        for field in template.fields() {
            if !template_parameters.iter().any(|t| t.param.name == field) {
                return Err(invalid(format!(
                    "placeholder {{{{.{}}}}} does not name a template parameter",
                    field
                )));
            }
        }
        if kind == ToolKind::Sql && !template_parameters.is_empty() {
            tracing::warn!(
                tool = name,
                params = ?template_parameters.iter().map(|t| t.param.name.as_str()).collect::<Vec<_>>(),
                "Tool substitutes template parameters into SQL text"
            );
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            source: config.source.clone(),
            description: config.description.clone(),
            parameters,
            template_parameters,
            statement,
            template,
            auth: AuthRequirements {
                required: config.auth_required.clone(),
                claim_services,
                use_client_oauth: config.use_client_oauth,
            },
            timeout: config.timeout.unwrap_or(source.query_timeout),
        })
    }

    /// Whether a caller-supplied argument of this name is accepted.
    pub fn accepts(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.param.name == name)
            || self.template_parameters.iter().any(|p| p.param.name == name)
    }

    /// JSON Schema of the arguments a caller supplies.
    ///
    /// Claim-filled parameters are omitted; the caller cannot set them.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for bound in self.parameters.iter().filter(|p| !p.is_claim_filled()) {
            let param = &bound.param;
            properties.insert(param.name.clone(), param.schema(param.description.clone()));
            if param.is_mandatory() {
                required.push(param.name.clone());
            }
        }
        for template in &self.template_parameters {
            let param = &template.param;
            let description = if self.kind == ToolKind::ExecuteSql {
                param.description.clone()
            } else {
                format!("{} (inserted into the SQL text verbatim)", param.description)
                    .trim_start()
                    .to_string()
            };
            properties.insert(param.name.clone(), param.schema(description));
            if param.is_mandatory() {
                required.push(param.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Auth metadata for tool listings.
    pub fn meta(&self) -> ToolMeta {
        let auth_param = self
            .parameters
            .iter()
            .filter(|p| p.is_claim_filled())
            .map(|p| {
                let services = p
                    .auth_sources
                    .iter()
                    .map(|s| Value::String(s.name.clone()))
                    .collect();
                (p.param.name.clone(), Value::Array(services))
            })
            .collect();
        ToolMeta {
            auth_invoke: self.auth.required.clone(),
            auth_param,
        }
    }

    /// Manifest entry for the REST toolset endpoints.
    pub fn manifest(&self) -> Value {
        let bound = self.parameters.iter().map(|p| {
            json!({
                "name": p.param.name,
                "type": p.param.kind.json_schema_type(),
                "description": p.param.description,
                "required": p.param.is_mandatory(),
                "template": false,
                "authSources": p.auth_sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            })
        });
        let template = self.template_parameters.iter().map(|p| {
            json!({
                "name": p.param.name,
                "type": p.param.kind.json_schema_type(),
                "description": p.param.description,
                "required": p.param.is_mandatory(),
                "template": true,
                "authSources": [],
            })
        });
        json!({
            "description": self.description,
            "parameters": bound.chain(template).collect::<Vec<_>>(),
            "authRequired": self.auth.required,
        })
    }
}
