//! # quarry-core
//!
//! Configuration types shared across the Quarry crates.
//!
//! A single YAML file describes everything the server exposes:
//!
//! ```yaml
//! sources:
//!   fleet-db:
//!     kind: postgres
//!     host: ${DB_HOST:-localhost}
//!     database: fleet
//!     user: toolbox
//!     password: ${DB_PASSWORD}
//!
//! authServices:
//!   corp-sso:
//!     kind: oidc
//!     issuer: https://sso.example.com
//!     clientId: quarry
//!
//! tools:
//!   find-car:
//!     kind: postgres-sql
//!     source: fleet-db
//!     description: Look up a car by plate.
//!     parameters:
//!       - name: plate
//!         type: string
//!     statement: SELECT * FROM cars WHERE plate = $1
//!
//! toolsets:
//!   fleet: [find-car]
//! ```
//!
//! Parsing only checks shape. Cross references (sources, auth services,
//! toolset members, template placeholders) are validated when the registry
//! is built from the parsed configuration.

pub mod config;

pub use config::{
    AuthParamRef, AuthServiceConfig, AuthServiceKind, ConfigError, ItemConfig, ParameterConfig,
    ParameterType, QuarryConfig, SourceConfig, SourceKind, ToolConfig,
};
