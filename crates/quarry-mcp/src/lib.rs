//! # quarry-mcp
//!
//! Database tools over the Model Context Protocol.
//!
//! Each configured tool is a SQL statement bound to a data source, with
//! two kinds of declared parameters:
//!
//! - **parameters** are bound to driver placeholders (`$1`, `?`) and never
//!   enter the statement text
//! - **templateParameters** are substituted into `{{.name}}` placeholders
//!   before execution (identifiers, column lists, raw SQL)
//!
//! ## Architecture
//!
//! ```text
//! MCP client / REST caller
//!       │
//!       │ tools/list, tools/call, POST /api/tool/{name}/invoke
//!       ▼
//! ┌─────────────────────┐
//! │  Dispatcher         │
//! │  1. Look up tool    │  ← Registry snapshot
//! │  2. Check auth      │  ← quarry-auth
//! │  3. Resolve params  │  ← claims + arguments
//! │  4. Execute         │  ← DataSource (sqlx pool)
//! │  5. Return JSON     │
//! └─────────┬───────────┘
//!           │
//!           ▼
//!   Postgres / MySQL / SQLite
//! ```
//!
//! ## Example Usage
//!
//! ```ignore
//! use quarry_core::QuarryConfig;
//! use quarry_mcp::{McpServer, Registry, RegistryHandle};
//!
//! let config = QuarryConfig::from_file("tools.yaml")?;
//! let registry = RegistryHandle::new(Registry::load(&config)?);
//! McpServer::new(registry).run_stdio().await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod http_transport;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod source;
pub mod template;
pub mod tool;

pub use dispatcher::{Dispatcher, InvocationContext, InvocationResult};
pub use error::{InvocationError, McpError};
pub use http_transport::{HttpServer, HttpTransportState, create_router};
pub use protocol::{JsonRpcRequest, JsonRpcResponse};
pub use registry::{Registry, RegistryHandle};
pub use resolver::{BoundValue, Resolved, ResolutionError, SqlValue, resolve};
pub use server::McpServer;
pub use source::{DataSource, ExecutionRequest, RowObject, SourceError, SqlSource};
pub use tool::{BoundParameterSpec, ParameterSpec, TemplateParameterSpec, ToolDefinition, ToolKind};
