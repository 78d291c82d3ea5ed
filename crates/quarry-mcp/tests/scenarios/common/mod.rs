//! Shared fixtures for scenario tests.

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use quarry_core::{QuarryConfig, SourceKind};
use quarry_mcp::{
    BoundValue, DataSource, Dispatcher, ExecutionRequest, HttpTransportState, McpServer, Registry,
    RegistryHandle, RowObject, SourceError, create_router,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const SECRET: &str = "dev-signing-secret";
pub const ISSUER: &str = "https://sso.example.com";

/// Configuration used by most scenarios.
pub const FLEET: &str = r#"
sources:
  fleet-db:
    kind: postgres
    database: fleet

authServices:
  svc-x:
    kind: oidc
    issuer: https://sso.example.com
    clientId: client-x
    sharedSecret: dev-signing-secret
    leeway: 0s
  svc-y:
    kind: oidc
    issuer: https://sso.example.com
    clientId: client-y
    sharedSecret: dev-signing-secret
    leeway: 0s

tools:
  run-query:
    kind: postgres-sql
    source: fleet-db
    description: Run a query.
    statement: "{{.query}}"
    templateParameters:
      - name: query
        type: string
  zeta:
    kind: postgres-sql
    source: fleet-db
    statement: "SELECT * FROM {{.tableName}} WHERE model = $1"
    parameters:
      - name: model
        type: string
    templateParameters:
      - name: tableName
        type: string
  alpha:
    kind: postgres-sql
    source: fleet-db
    statement: SELECT 1
  secure-tool:
    kind: postgres-sql
    source: fleet-db
    statement: SELECT 2
    authRequired: [svc-x, svc-y]
  my-orders:
    kind: postgres-sql
    source: fleet-db
    statement: SELECT * FROM orders WHERE owner = $1
    authRequired: [svc-x]
    parameters:
      - name: owner
        type: string
        authServices:
          - name: svc-x
            field: email
  raw-sql:
    kind: postgres-execute-sql
    source: fleet-db
  tables:
    kind: postgres-list-tables
    source: fleet-db
  slow:
    kind: postgres-sql
    source: fleet-db
    statement: SELECT pg_sleep(10)
    timeout: 50ms
  forwarded:
    kind: postgres-sql
    source: fleet-db
    statement: SELECT current_user
    useClientOAuth: true

toolsets:
  ordered: [zeta, alpha]
"#;

/// One statement as seen by the data source.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub statement: String,
    pub bound: Vec<BoundValue>,
    pub client_token: Option<String>,
}

/// Records every execution and answers with fixed rows.
///
/// Statements containing `pg_sleep` block until the invocation deadline.
pub struct RecordingSource {
    calls: Mutex<Vec<Recorded>>,
    rows: Vec<RowObject>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::with_rows(json!([{"ok": true}]))
    }

    pub fn with_rows(rows: Value) -> Self {
        let rows = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect();
        Self {
            calls: Mutex::new(Vec::new()),
            rows,
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for RecordingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn execute(&self, request: ExecutionRequest<'_>) -> Result<Vec<RowObject>, SourceError> {
        self.calls.lock().unwrap().push(Recorded {
            statement: request.statement.to_string(),
            bound: request.bound.to_vec(),
            client_token: request.client_token.map(str::to_string),
        });
        if request.statement.contains("pg_sleep") {
            tokio::time::sleep(request.timeout + Duration::from_millis(10)).await;
            return Err(SourceError::Timeout(request.timeout));
        }
        Ok(self.rows.clone())
    }
}

/// A loaded registry wired to one recording source.
pub struct TestContext {
    pub registry: RegistryHandle,
    pub source: Arc<RecordingSource>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_source(FLEET, RecordingSource::new())
    }

    pub fn with_source(yaml: &str, source: RecordingSource) -> Self {
        let source = Arc::new(source);
        Self {
            registry: RegistryHandle::new(load(yaml, source.clone())),
            source,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.registry.clone())
    }

    pub fn router(&self) -> axum::Router {
        let server = McpServer::new(self.registry.clone());
        create_router(Arc::new(HttpTransportState::new(server)))
    }
}

/// Load a registry whose every source is `source`.
pub fn load(yaml: &str, source: Arc<RecordingSource>) -> Registry {
    let config = QuarryConfig::from_yaml_with(yaml, |_| None).unwrap();
    Registry::load_with(&config, move |_, _| Ok(source.clone() as Arc<dyn DataSource>)).unwrap()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A token signed for `client_id` carrying `email`.
pub fn token(client_id: &str, email: &str) -> String {
    encode(
        &Header::default(),
        &json!({
            "iss": ISSUER,
            "aud": client_id,
            "sub": "1234",
            "email": email,
            "exp": now() + 600,
        }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// A token that fails validation (wrong signing key).
pub fn forged_token(client_id: &str) -> String {
    encode(
        &Header::default(),
        &json!({
            "iss": ISSUER,
            "aud": client_id,
            "email": "mallory@example.com",
            "exp": now() + 600,
        }),
        &EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap()
}
