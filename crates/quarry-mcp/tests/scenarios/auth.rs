//! Auth gate scenarios through the dispatcher.

use crate::common::{TestContext, forged_token, token};
use quarry_auth::RequestHeaders;
use quarry_mcp::{InvocationContext, SqlValue};
use serde_json::json;

fn http(headers: &[(&str, String)]) -> InvocationContext {
    InvocationContext::http(headers.iter().cloned().collect::<RequestHeaders>())
}

#[tokio::test]
async fn test_any_required_service_grants_access() {
    let ctx = TestContext::new();

    // Only svc-y validates; svc-x presents a forged token.
    let headers = http(&[
        ("svc-x_token", forged_token("client-x")),
        ("svc-y_token", token("client-y", "ada@example.com")),
    ]);
    let result = ctx.dispatcher().invoke("secure-tool", json!({}), &headers).await;

    assert!(result.is_ok());
    assert_eq!(ctx.source.calls().len(), 1);
}

#[tokio::test]
async fn test_no_validating_service_is_unauthorized() {
    let ctx = TestContext::new();

    let headers = http(&[
        ("svc-x_token", forged_token("client-x")),
        // Signed correctly but for the wrong audience.
        ("svc-y_token", token("client-x", "ada@example.com")),
    ]);
    let err = ctx
        .dispatcher()
        .invoke("secure-tool", json!({}), &headers)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "unauthorized");
    assert!(ctx.source.calls().is_empty());
}

#[tokio::test]
async fn test_no_headers_is_unauthorized() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("secure-tool", json!({}), &http(&[]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "unauthorized");
}

#[tokio::test]
async fn test_stdio_bypasses_auth() {
    let ctx = TestContext::new();

    let result = ctx
        .dispatcher()
        .invoke("secure-tool", json!({}), &InvocationContext::stdio())
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_claim_fills_parameter_and_overrides_client_value() {
    let ctx = TestContext::new();

    let headers = http(&[("svc-x_token", token("client-x", "ada@example.com"))]);
    ctx.dispatcher()
        .invoke("my-orders", json!({"owner": "mallory@example.com"}), &headers)
        .await
        .unwrap();

    let calls = ctx.source.calls();
    assert_eq!(calls[0].statement, "SELECT * FROM orders WHERE owner = $1");
    assert_eq!(
        calls[0].bound[0].value,
        SqlValue::Text("ada@example.com".to_string())
    );
}

#[tokio::test]
async fn test_client_oauth_token_forwarded() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("forwarded", json!({}), &http(&[]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unauthorized");

    let headers = http(&[("Authorization", "Bearer caller-token".to_string())]);
    ctx.dispatcher()
        .invoke("forwarded", json!({}), &headers)
        .await
        .unwrap();
    assert_eq!(
        ctx.source.calls()[0].client_token.as_deref(),
        Some("caller-token")
    );
}
