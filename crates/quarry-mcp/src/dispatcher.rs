//! Invocation dispatch.
//!
//! Drives one invocation through its stages:
//! `Received → AuthChecked → ParamsResolved → Executed → Succeeded | Failed`.
//! Any failing stage short-circuits; nothing reaches a data source unless
//! auth and resolution both succeeded.

use crate::error::InvocationError;
use crate::registry::{Registry, RegistryHandle};
use crate::resolver::resolve;
use crate::source::{ExecutionRequest, RowObject};
use crate::tool::{ToolDefinition, ToolKind};
use quarry_auth::{RequestHeaders, Transport};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Per-invocation context supplied by the transport.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub headers: RequestHeaders,
    pub transport: Transport,
    /// Toolset the caller is scoped to; empty for every tool.
    pub toolset: String,
}

impl InvocationContext {
    pub fn http(headers: RequestHeaders) -> Self {
        Self {
            headers,
            transport: Transport::Http,
            toolset: String::new(),
        }
    }

    pub fn stdio() -> Self {
        Self {
            headers: RequestHeaders::new(),
            transport: Transport::Stdio,
            toolset: String::new(),
        }
    }

    pub fn with_toolset(mut self, toolset: impl Into<String>) -> Self {
        self.toolset = toolset.into();
        self
    }
}

/// Successful invocation output.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub tool: String,
    /// Rows as JSON objects, or `{"tables": [...]}` for listing tools.
    pub output: Value,
}

/// Routes invocations to the tool's source.
#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Invoke a tool by name.
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<InvocationResult, InvocationError> {
        let snapshot = self.registry.snapshot().await;
        let span = tracing::info_span!("invoke", tool = tool_name, transport = ?ctx.transport);
        let started = Instant::now();

        let result = invoke_on(snapshot, tool_name, args, ctx)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        span.in_scope(|| match &result {
            Ok(_) => tracing::info!(stage = "succeeded", elapsed_ms, "Invocation succeeded"),
            Err(e) => tracing::warn!(
                stage = "failed",
                kind = e.kind(),
                error = %e,
                elapsed_ms,
                "Invocation failed"
            ),
        });
        result
    }
}

async fn invoke_on(
    snapshot: Arc<Registry>,
    tool_name: &str,
    args: Value,
    ctx: &InvocationContext,
) -> Result<InvocationResult, InvocationError> {
    tracing::debug!(stage = "received");
    let tool = snapshot.get_in_toolset(&ctx.toolset, tool_name)?;

    let auth = snapshot
        .auth()
        .check(&tool.auth, &ctx.headers, ctx.transport)
        .await?;
    tracing::debug!(stage = "auth_checked", services = auth.claims.len());

    let args = into_arguments(args)?;
    let resolved = resolve(tool, &args, &auth)?;
    tracing::debug!(stage = "params_resolved", bound = resolved.bound.len());

    let source = snapshot.source(&tool.source).ok_or_else(|| {
        InvocationError::Execution(format!("source {} is not available", tool.source))
    })?;
    let rows = source
        .execute(ExecutionRequest {
            statement: &resolved.statement,
            bound: &resolved.bound,
            timeout: tool.timeout,
            client_token: auth.client_token.as_deref(),
        })
        .await?;
    tracing::debug!(stage = "executed", rows = rows.len());

    Ok(InvocationResult {
        tool: tool.name.clone(),
        output: shape_output(tool, rows),
    })
}

fn into_arguments(args: Value) -> Result<Map<String, Value>, InvocationError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(InvocationError::InvalidArgument {
            name: "arguments".to_string(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

fn shape_output(tool: &ToolDefinition, rows: Vec<RowObject>) -> Value {
    match tool.kind {
        ToolKind::ListTables => {
            let tables: Vec<Value> = rows
                .into_iter()
                .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
                .collect();
            json!({ "tables": tables })
        }
        ToolKind::Sql | ToolKind::ExecuteSql => {
            Value::Array(rows.into_iter().map(Value::Object).collect())
        }
    }
}
