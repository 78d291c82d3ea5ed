//! Error types for the MCP crate.

use quarry_auth::AuthError;
use quarry_core::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Typed failure of a single tool invocation.
///
/// Every variant is surfaced to the caller; none is downgraded to an empty
/// or partial success.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// No tool with this name in the current snapshot (or toolset scope).
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// No toolset with this name.
    #[error("toolset not found: {name}")]
    ToolsetNotFound { name: String },

    /// Missing, unknown or mistyped argument. Nothing was executed.
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    /// A `{{.name}}` placeholder had no value. Nothing was executed.
    #[error("template placeholder {{{{.{name}}}}} has no value")]
    UnresolvedTemplate { name: String },

    /// Auth required and not satisfied. Nothing was executed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The data source rejected or failed the statement.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Execution or connection acquisition exceeded the ceiling.
    #[error("execution exceeded the {}ms limit", .0.as_millis())]
    Timeout(Duration),
}

impl InvocationError {
    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::ToolNotFound { .. } => "tool_not_found",
            InvocationError::ToolsetNotFound { .. } => "toolset_not_found",
            InvocationError::InvalidArgument { .. } => "invalid_argument",
            InvocationError::UnresolvedTemplate { .. } => "unresolved_template",
            InvocationError::Unauthorized(_) => "unauthorized",
            InvocationError::Execution(_) => "execution_error",
            InvocationError::Timeout(_) => "timeout",
        }
    }

    /// Whether the failure happened while running the statement, as opposed
    /// to being a rejected request. MCP reports these as tool results with
    /// `isError: true` rather than protocol errors.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            InvocationError::Execution(_) | InvocationError::Timeout(_)
        )
    }

    /// JSON-RPC error code for protocol-level failures.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            InvocationError::ToolNotFound { .. }
            | InvocationError::ToolsetNotFound { .. }
            | InvocationError::InvalidArgument { .. }
            | InvocationError::UnresolvedTemplate { .. } => -32602,
            InvocationError::Unauthorized(_) => -32001,
            InvocationError::Execution(_) | InvocationError::Timeout(_) => -32603,
        }
    }
}

impl From<AuthError> for InvocationError {
    fn from(e: AuthError) -> Self {
        InvocationError::Unauthorized(e.to_string())
    }
}

/// Errors that can occur in the MCP server itself.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
