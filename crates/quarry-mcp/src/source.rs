//! Data sources.
//!
//! A [`DataSource`] executes one resolved statement with its bound values
//! under a deadline. [`SqlSource`] is the production implementation: one
//! lazily connected `sqlx` pool per configured source, shared by every
//! invocation that targets it.

use crate::error::InvocationError;
use crate::resolver::{BoundValue, SqlValue};
use async_trait::async_trait;
use quarry_core::{ConfigError, SourceConfig, SourceKind};
use serde_json::{Map, Value};
use sqlx::any::{Any, AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{AnyPool, Column, Row, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use thiserror::Error;

/// One result row, keyed by column name.
pub type RowObject = Map<String, Value>;

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Error raised by a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Execution(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<SourceError> for InvocationError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Execution(message) => InvocationError::Execution(message),
            SourceError::Timeout(limit) => InvocationError::Timeout(limit),
        }
    }
}

/// Everything a source needs to run one statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub statement: &'a str,
    pub bound: &'a [BoundValue],
    pub timeout: Duration,
    /// Caller bearer token, for sources that act on the caller's behalf.
    /// [`SqlSource`] ignores it.
    pub client_token: Option<&'a str>,
}

/// Something that can execute statements.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Engine behind this source.
    fn kind(&self) -> SourceKind;

    /// Execute exactly one statement, returning its rows.
    async fn execute(&self, request: ExecutionRequest<'_>) -> Result<Vec<RowObject>, SourceError>;
}

/// Default statement of `list-tables` tools for each engine.
pub fn list_tables_statement(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Postgres => {
            "SELECT table_schema || '.' || table_name AS table_name \
             FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' \
             AND table_schema NOT IN ('pg_catalog', 'information_schema') \
             ORDER BY 1"
        }
        SourceKind::Mysql => {
            "SELECT CAST(table_name AS CHAR) AS table_name \
             FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema = DATABASE() \
             ORDER BY 1"
        }
        SourceKind::Sqlite => {
            "SELECT name AS table_name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        }
    }
}

/// Pooled SQL source.
pub struct SqlSource {
    name: String,
    kind: SourceKind,
    pool: AnyPool,
}

impl SqlSource {
    /// Create the pool without opening a connection.
    ///
    /// Connections are established on first use, so loading a configuration
    /// does not require every database to be reachable.
    pub fn connect_lazy(name: &str, config: &SourceConfig) -> Result<Self, ConfigError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.connection_url())
            .map_err(|e| ConfigError::invalid(format!("sources.{}", name), e.to_string()))?;

        tracing::info!(
            source = name,
            kind = %config.kind,
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Source pool created"
        );

        Ok(Self {
            name: name.to_string(),
            kind: config.kind,
            pool,
        })
    }

    /// Acquire a connection, retrying only while the pool is exhausted.
    async fn acquire(&self, limit: Duration) -> Result<PoolConnection<Any>, SourceError> {
        let mut attempt = 1;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.pool.acquire().await {
                Ok(conn) => return Ok(conn),
                Err(sqlx::Error::PoolTimedOut) if attempt < MAX_ACQUIRE_ATTEMPTS => {
                    tracing::warn!(
                        source = %self.name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Connection pool exhausted, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(sqlx::Error::PoolTimedOut) => {
                    tracing::warn!(source = %self.name, attempt, "No connection available");
                    return Err(SourceError::Timeout(limit));
                }
                Err(e) => return Err(SourceError::Execution(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl DataSource for SqlSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn execute(&self, request: ExecutionRequest<'_>) -> Result<Vec<RowObject>, SourceError> {
        let started = Instant::now();
        let mut conn = tokio::time::timeout(request.timeout, self.acquire(request.timeout))
            .await
            .map_err(|_| SourceError::Timeout(request.timeout))??;

        let remaining = remaining_budget(request.timeout, started)?;
        let mut query = sqlx::query(request.statement);
        for bound in request.bound {
            query = bind(query, &bound.value);
        }

        let outcome = tokio::time::timeout(remaining, query.fetch_all(&mut *conn)).await;
        match outcome {
            Ok(Ok(rows)) => rows.iter().map(row_to_object).collect(),
            Ok(Err(e)) => Err(SourceError::Execution(e.to_string())),
            Err(_) => {
                // The statement may still be running server side; do not hand
                // this connection to the next caller.
                drop(conn.detach());
                tracing::warn!(source = %self.name, "Statement timed out, connection discarded");
                Err(SourceError::Timeout(request.timeout))
            }
        }
    }
}

/// Time left for the statement once a connection is in hand.
fn remaining_budget(limit: Duration, started: Instant) -> Result<Duration, SourceError> {
    let remaining = limit.saturating_sub(started.elapsed());
    if remaining.is_zero() {
        return Err(SourceError::Timeout(limit));
    }
    Ok(remaining)
}

fn bind<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.as_str()),
        SqlValue::Array(items) => query.bind(Value::Array(items.clone()).to_string()),
    }
}

fn row_to_object(row: &AnyRow) -> Result<RowObject, SourceError> {
    let decode_error =
        |column: &str, e: sqlx::Error| SourceError::Execution(format!("column {}: {}", column, e));

    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row.try_get_raw(i).map_err(|e| decode_error(name, e))?;
        if raw.is_null() {
            object.insert(name.to_string(), Value::Null);
            continue;
        }

        // Computed sqlite columns report NULL as their declared type; the
        // value carries the real one.
        let type_info = raw.type_info();
        let value = match type_info.name() {
            "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::from),
            "SMALLINT" => row.try_get::<i16, _>(i).map(Value::from),
            "INTEGER" => row.try_get::<i32, _>(i).map(Value::from),
            "BIGINT" => row.try_get::<i64, _>(i).map(Value::from),
            "REAL" => row.try_get::<f32, _>(i).map(|f| Value::from(f as f64)),
            "DOUBLE" => row.try_get::<f64, _>(i).map(Value::from),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(i)
                .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            _ => row.try_get::<String, _>(i).map(Value::String),
        }
        .map_err(|e| decode_error(name, e))?;
        object.insert(name.to_string(), value);
    }
    Ok(object)
}
