//! HTTP surface scenarios: JSON-RPC, REST invoke and manifests.

use crate::common::{TestContext, token};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn rpc(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params})
}

#[tokio::test]
async fn test_tools_list_carries_auth_meta() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post("/mcp", rpc("tools/list", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    let secure = tools.iter().find(|t| t["name"] == "secure-tool").unwrap();
    assert_eq!(secure["_meta"]["authInvoke"], json!(["svc-x", "svc-y"]));

    let orders = tools.iter().find(|t| t["name"] == "my-orders").unwrap();
    assert_eq!(orders["_meta"]["authParam"]["owner"], json!(["svc-x"]));
    assert!(orders["inputSchema"]["properties"].get("owner").is_none());
}

#[tokio::test]
async fn test_toolset_scoped_listing() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post("/mcp/ordered", rpc("tools/list", json!({}))))
        .await
        .unwrap();

    let body = body_json(response).await;
    let names: Vec<_> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[tokio::test]
async fn test_notification_is_accepted() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post(
            "/mcp",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_tools_call_unauthorized_is_protocol_error() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post(
            "/mcp",
            rpc("tools/call", json!({"name": "secure-tool", "arguments": {}})),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["data"]["kind"], "unauthorized");
}

#[tokio::test]
async fn test_tools_call_with_token_header() {
    let ctx = TestContext::new();

    let mut request = post(
        "/mcp",
        rpc("tools/call", json!({"name": "secure-tool", "arguments": {}})),
    );
    request.headers_mut().insert(
        "svc-x_token",
        token("client-x", "ada@example.com").parse().unwrap(),
    );
    let response = ctx.router().oneshot(request).await.unwrap();

    let body = body_json(response).await;
    assert!(body.get("error").is_none());
    assert_eq!(body["result"]["content"][0]["type"], "text");
}

#[tokio::test]
async fn test_rest_invoke_success() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post(
            "/api/tool/run-query/invoke",
            json!({"query": "SELECT TOP 5 * FROM CarReport"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"result": [{"ok": true}]}));
}

#[tokio::test]
async fn test_rest_invoke_status_codes() {
    let ctx = TestContext::new();

    let cases = [
        ("/api/tool/nope/invoke", json!({}), StatusCode::NOT_FOUND),
        ("/api/tool/run-query/invoke", json!({}), StatusCode::BAD_REQUEST),
        ("/api/tool/secure-tool/invoke", json!({}), StatusCode::UNAUTHORIZED),
        ("/api/tool/slow/invoke", json!({}), StatusCode::GATEWAY_TIMEOUT),
    ];
    for (uri, body, expected) in cases {
        let response = ctx.router().oneshot(post(uri, body)).await.unwrap();
        assert_eq!(response.status(), expected, "{uri}");
    }
}

#[tokio::test]
async fn test_rest_error_body() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(post("/api/tool/run-query/invoke", json!({"query": 5})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "invalid_argument");
}

#[tokio::test]
async fn test_toolset_manifest() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/toolset/ordered")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let zeta = &body["tools"]["zeta"];
    assert_eq!(zeta["parameters"][0]["name"], "model");
    assert_eq!(zeta["parameters"][0]["template"], false);
    assert_eq!(zeta["parameters"][1]["name"], "tableName");
    assert_eq!(zeta["parameters"][1]["template"], true);
    assert!(body["tools"].get("run-query").is_none());
}

#[tokio::test]
async fn test_unknown_toolset_manifest() {
    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/toolset/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sse_stream_announces_endpoint() {
    use futures::StreamExt;

    let ctx = TestContext::new();

    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .uri("/mcp/sse")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = response.into_body().into_data_stream();
    let first = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.contains("event: endpoint"));
    assert!(text.contains("/mcp/message?sessionId="));
}
