//! HTTP transport for the MCP server.
//!
//! Serves three surfaces from one router:
//!
//! - stateless JSON-RPC on `POST /mcp` and `POST /mcp/{toolset}`
//! - SSE sessions on `GET /mcp/sse` / `GET /mcp/{toolset}/sse`, with client
//!   messages posted to `/mcp/message?sessionId=…`
//! - a REST surface: `POST /api/tool/{name}/invoke` and the toolset
//!   manifests under `/api/toolset`
//!
//! Every request carries its own headers into the auth gate.

use crate::dispatcher::InvocationContext;
use crate::error::{InvocationError, McpError};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, codes};
use crate::server::McpServer;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use quarry_auth::RequestHeaders;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tower_http::trace::TraceLayer;

/// An open SSE session.
#[derive(Clone)]
struct SseSession {
    toolset: String,
    tx: mpsc::Sender<String>,
}

/// HTTP transport handler state.
pub struct HttpTransportState {
    server: McpServer,
    /// Active SSE sessions by id.
    sessions: RwLock<HashMap<String, SseSession>>,
}

impl HttpTransportState {
    /// Create a new HTTP transport state.
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of open SSE sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Query parameters of the SSE message endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpTransportState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/mcp", post(handle_mcp_default))
        .route("/mcp/sse", get(handle_sse_default))
        .route("/mcp/message", post(handle_message))
        .route("/mcp/{toolset}", post(handle_mcp_toolset))
        .route("/mcp/{toolset}/sse", get(handle_sse_toolset))
        .route("/api/toolset", get(handle_manifest_default))
        .route("/api/toolset/{toolset}", get(handle_manifest))
        .route("/api/tool/{name}/invoke", post(handle_invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect()
}

fn parse_error(e: serde_json::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(JsonRpcResponse::error(
            None,
            codes::PARSE_ERROR,
            format!("Parse error: {}", e),
        )),
    )
        .into_response()
}

async fn handle_mcp_default(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_mcp(state, String::new(), headers, body).await
}

async fn handle_mcp_toolset(
    State(state): State<Arc<HttpTransportState>>,
    Path(toolset): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_mcp(state, toolset, headers, body).await
}

/// JSON-RPC over a single HTTP request.
async fn handle_mcp(
    state: Arc<HttpTransportState>,
    toolset: String,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return parse_error(e),
    };
    let ctx = InvocationContext::http(request_headers(&headers)).with_toolset(toolset);

    match state.server.handle_request(request, &ctx).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_sse_default(State(state): State<Arc<HttpTransportState>>) -> Response {
    open_sse(state, String::new()).await
}

async fn handle_sse_toolset(
    State(state): State<Arc<HttpTransportState>>,
    Path(toolset): Path<String>,
) -> Response {
    open_sse(state, toolset).await
}

/// Removes the session when the SSE stream is dropped.
struct SessionGuard {
    state: Arc<HttpTransportState>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let state = self.state.clone();
        let id = std::mem::take(&mut self.id);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                state.sessions.write().await.remove(&id);
                tracing::debug!(session = %id, "SSE session closed");
            });
        }
    }
}

/// Open an SSE session. The first event tells the client where to post.
async fn open_sse(state: Arc<HttpTransportState>, toolset: String) -> Response {
    if !toolset.is_empty() {
        let snapshot = state.server.registry().snapshot().await;
        if let Err(e) = snapshot.resolve_toolset(&toolset) {
            return invocation_error(&e);
        }
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(32);
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), SseSession { toolset, tx });
    tracing::debug!(session = %session_id, "SSE session opened");

    let endpoint = format!("/mcp/message?sessionId={}", session_id);
    let guard = SessionGuard {
        state: state.clone(),
        id: session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(message) = rx.recv().await {
            yield Ok(Event::default().event("message").data(message));
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
        .into_response()
}

/// Client → server message for an SSE session; the response goes out on the stream.
async fn handle_message(
    State(state): State<Arc<HttpTransportState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = state.sessions.read().await.get(&query.session_id).cloned();
    let Some(session) = session else {
        return (
            StatusCode::NOT_FOUND,
            Json(JsonRpcResponse::error(
                None,
                codes::INVALID_REQUEST,
                format!("Unknown session: {}", query.session_id),
            )),
        )
            .into_response();
    };

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return parse_error(e),
    };
    let ctx = InvocationContext::http(request_headers(&headers)).with_toolset(session.toolset);
    let server = state.server.clone();
    let tx = session.tx;

    tokio::spawn(async move {
        tokio::select! {
            response = server.handle_request(request, &ctx) => {
                let Some(response) = response else { return };
                match serde_json::to_string(&response) {
                    Ok(message) => {
                        let _ = tx.send(message).await;
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to serialize response"),
                }
            }
            _ = tx.closed() => {
                tracing::debug!("SSE client went away, abandoning request");
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}

/// `POST /api/tool/{name}/invoke`: body is the argument object.
async fn handle_invoke(
    State(state): State<Arc<HttpTransportState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let args = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(args) => args,
            Err(e) => {
                return invocation_error(&InvocationError::InvalidArgument {
                    name: "body".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    };

    let ctx = InvocationContext::http(request_headers(&headers));
    match state.server.dispatcher().invoke(&name, args, &ctx).await {
        Ok(result) => Json(json!({ "result": result.output })).into_response(),
        Err(e) => invocation_error(&e),
    }
}

async fn handle_manifest_default(State(state): State<Arc<HttpTransportState>>) -> Response {
    manifest(state, "").await
}

async fn handle_manifest(
    State(state): State<Arc<HttpTransportState>>,
    Path(toolset): Path<String>,
) -> Response {
    manifest(state, &toolset).await
}

async fn manifest(state: Arc<HttpTransportState>, toolset: &str) -> Response {
    let snapshot = state.server.registry().snapshot().await;
    match snapshot.resolve_toolset(toolset) {
        Ok(tools) => {
            let tools: Map<String, Value> = tools
                .into_iter()
                .map(|tool| (tool.name.clone(), tool.manifest()))
                .collect();
            Json(json!({
                "serverVersion": env!("CARGO_PKG_VERSION"),
                "tools": tools,
            }))
            .into_response()
        }
        Err(e) => invocation_error(&e),
    }
}

/// HTTP status for an invocation failure.
pub fn status_for(error: &InvocationError) -> StatusCode {
    match error {
        InvocationError::ToolNotFound { .. } | InvocationError::ToolsetNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        InvocationError::InvalidArgument { .. } | InvocationError::UnresolvedTemplate { .. } => {
            StatusCode::BAD_REQUEST
        }
        InvocationError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        InvocationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        InvocationError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn invocation_error(error: &InvocationError) -> Response {
    (
        status_for(error),
        Json(json!({
            "error": {
                "kind": error.kind(),
                "message": error.to_string(),
            }
        })),
    )
        .into_response()
}

/// Handle health check requests.
async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "quarry",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// HTTP server for the MCP and REST surfaces.
pub struct HttpServer {
    addr: SocketAddr,
    state: Arc<HttpTransportState>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, server: McpServer) -> Self {
        Self {
            addr,
            state: Arc::new(HttpTransportState::new(server)),
        }
    }

    /// Run until `shutdown` resolves. In-flight requests are allowed to finish.
    pub async fn run<F>(self, shutdown: F) -> Result<(), McpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| McpError::StartupFailed(format!("Failed to bind to {}: {}", self.addr, e)))?;

        tracing::info!(addr = %self.addr, "MCP HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
