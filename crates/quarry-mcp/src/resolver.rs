//! Parameter resolution.
//!
//! Turns caller arguments (plus validated claims) into the final statement
//! text and the ordered list of values bound to driver placeholders. Two
//! namespaces never mix: bound values stay out of the statement text, and
//! template values only ever reach the text.

use crate::error::InvocationError;
use crate::tool::{BoundParameterSpec, ParameterSpec, ToolDefinition};
use crate::template::text_form;
use quarry_auth::claims::claim;
use quarry_auth::AuthOutcome;
use quarry_core::ParameterType;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Value passed to the driver out-of-band.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Bound as JSON text.
    Array(Vec<Value>),
}

impl SqlValue {
    fn from_checked(kind: ParameterType, value: Value) -> Self {
        match (kind, value) {
            (_, Value::Null) => SqlValue::Null,
            (ParameterType::Integer, v) => v.as_i64().map(SqlValue::Int).unwrap_or(SqlValue::Null),
            (ParameterType::Float, v) => v.as_f64().map(SqlValue::Float).unwrap_or(SqlValue::Null),
            (ParameterType::Boolean, Value::Bool(b)) => SqlValue::Bool(b),
            (ParameterType::Array, Value::Array(items)) => SqlValue::Array(items),
            (_, Value::String(s)) => SqlValue::Text(s),
            (_, other) => SqlValue::Text(text_form(&other)),
        }
    }
}

/// A value bound to the placeholder at `index` (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub index: usize,
    pub name: String,
    pub value: SqlValue,
}

/// Output of resolution, ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Statement with every template placeholder substituted.
    pub statement: String,
    /// Bound values in declaration order.
    pub bound: Vec<BoundValue>,
}

/// Why resolution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("template placeholder {{{{.{name}}}}} has no value")]
    UnresolvedTemplate { name: String },

    /// A claim-filled parameter had no validated claim to draw from.
    #[error("parameter {name} requires a validated token from one of: {}", .services.join(", "))]
    Unauthorized { name: String, services: Vec<String> },
}

impl From<ResolutionError> for InvocationError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::InvalidArgument { name, reason } => {
                InvocationError::InvalidArgument { name, reason }
            }
            ResolutionError::UnresolvedTemplate { name } => {
                InvocationError::UnresolvedTemplate { name }
            }
            e @ ResolutionError::Unauthorized { .. } => InvocationError::Unauthorized(e.to_string()),
        }
    }
}

/// Resolve caller arguments against a tool's declared parameters.
pub fn resolve(
    tool: &ToolDefinition,
    args: &Map<String, Value>,
    auth: &AuthOutcome,
) -> Result<Resolved, ResolutionError> {
    if let Some(unknown) = args.keys().find(|name| !tool.accepts(name)) {
        return Err(ResolutionError::InvalidArgument {
            name: unknown.clone(),
            reason: "not a parameter of this tool".to_string(),
        });
    }

    let mut bound = Vec::with_capacity(tool.parameters.len());
    for (i, spec) in tool.parameters.iter().enumerate() {
        let value = if spec.is_claim_filled() && !auth.bypassed {
            claim_value(spec, auth)?
        } else {
            argument_value(&spec.param, args)?
        };
        let value = match value {
            Some(v) if !v.is_null() => check(&spec.param, &v)?,
            _ => Value::Null,
        };
        bound.push(BoundValue {
            index: i + 1,
            name: spec.param.name.clone(),
            value: SqlValue::from_checked(spec.param.kind, value),
        });
    }

    let mut text_values = HashMap::new();
    for spec in &tool.template_parameters {
        if let Some(value) = argument_value(&spec.param, args)?
            && !value.is_null()
        {
            let value = check(&spec.param, &value)?;
            text_values.insert(spec.param.name.clone(), text_form(&value));
        }
    }

    let statement = tool
        .template
        .render(&text_values)
        .map_err(|name| ResolutionError::UnresolvedTemplate { name })?;

    Ok(Resolved { statement, bound })
}

/// Argument, then default. An explicit `null` counts as absent when a
/// default exists. Missing and mandatory is an error.
fn argument_value(
    param: &ParameterSpec,
    args: &Map<String, Value>,
) -> Result<Option<Value>, ResolutionError> {
    match args.get(&param.name) {
        Some(Value::Null) | None if param.default.is_some() => Ok(param.default.clone()),
        Some(Value::Null) if param.required => Err(ResolutionError::InvalidArgument {
            name: param.name.clone(),
            reason: "must not be null".to_string(),
        }),
        Some(value) => Ok(Some(value.clone())),
        None if param.is_mandatory() => Err(ResolutionError::InvalidArgument {
            name: param.name.clone(),
            reason: "missing required argument".to_string(),
        }),
        None => Ok(None),
    }
}

/// First claim available among the parameter's auth sources.
fn claim_value(
    spec: &BoundParameterSpec,
    auth: &AuthOutcome,
) -> Result<Option<Value>, ResolutionError> {
    for source in &spec.auth_sources {
        if let Some(claims) = auth.claims.get(&source.name)
            && let Some(value) = claim(claims, &source.field)
        {
            return Ok(Some(value.clone()));
        }
    }
    Err(ResolutionError::Unauthorized {
        name: spec.param.name.clone(),
        services: spec.auth_sources.iter().map(|s| s.name.clone()).collect(),
    })
}

fn check(param: &ParameterSpec, value: &Value) -> Result<Value, ResolutionError> {
    param
        .check(value)
        .map_err(|reason| ResolutionError::InvalidArgument {
            name: param.name.clone(),
            reason,
        })
}
