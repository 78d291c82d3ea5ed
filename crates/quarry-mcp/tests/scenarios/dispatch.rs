//! Dispatch scenarios: resolution, execution and result shaping.

use crate::common::{FLEET, RecordingSource, TestContext, load};
use quarry_mcp::{InvocationContext, InvocationError, SqlValue};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_run_query_renders_template_and_executes() {
    let ctx = TestContext::new();

    let result = ctx
        .dispatcher()
        .invoke(
            "run-query",
            json!({"query": "SELECT TOP 5 * FROM CarReport"}),
            &InvocationContext::stdio(),
        )
        .await
        .unwrap();

    assert_eq!(result.output, json!([{"ok": true}]));
    let calls = ctx.source.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].statement, "SELECT TOP 5 * FROM CarReport");
    assert!(calls[0].bound.is_empty());
}

#[tokio::test]
async fn test_bound_injection_string_stays_out_of_statement() {
    let ctx = TestContext::new();
    let injection = "'; DROP TABLE x; --";

    ctx.dispatcher()
        .invoke(
            "zeta",
            json!({"tableName": "cars", "model": injection}),
            &InvocationContext::stdio(),
        )
        .await
        .unwrap();

    let calls = ctx.source.calls();
    assert_eq!(calls[0].statement, "SELECT * FROM cars WHERE model = $1");
    assert!(!calls[0].statement.contains("DROP"));
    assert_eq!(calls[0].bound[0].index, 1);
    assert_eq!(calls[0].bound[0].value, SqlValue::Text(injection.to_string()));
}

#[tokio::test]
async fn test_missing_template_argument_never_executes() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("zeta", json!({"model": "T"}), &InvocationContext::stdio())
        .await
        .unwrap_err();

    assert!(matches!(err, InvocationError::InvalidArgument { ref name, .. } if name == "tableName"));
    assert!(ctx.source.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_tool() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("nope", json!({}), &InvocationContext::stdio())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "tool_not_found");
}

#[tokio::test]
async fn test_non_object_arguments_rejected() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("alpha", json!([1, 2]), &InvocationContext::stdio())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "invalid_argument");
}

#[tokio::test]
async fn test_execute_sql_passes_caller_statement() {
    let ctx = TestContext::new();

    ctx.dispatcher()
        .invoke(
            "raw-sql",
            json!({"sql": "SELECT count(*) FROM cars"}),
            &InvocationContext::stdio(),
        )
        .await
        .unwrap();

    assert_eq!(ctx.source.calls()[0].statement, "SELECT count(*) FROM cars");
}

#[tokio::test]
async fn test_list_tables_shapes_output() {
    let ctx = TestContext::with_source(
        FLEET,
        RecordingSource::with_rows(json!([{"table_name": "cars"}, {"table_name": "owners"}])),
    );

    let result = ctx
        .dispatcher()
        .invoke("tables", json!(null), &InvocationContext::stdio())
        .await
        .unwrap();

    assert_eq!(result.output, json!({"tables": ["cars", "owners"]}));
    assert!(ctx.source.calls()[0].statement.contains("information_schema.tables"));
}

#[tokio::test]
async fn test_timeout_surfaces_as_timeout() {
    let ctx = TestContext::new();

    let err = ctx
        .dispatcher()
        .invoke("slow", json!({}), &InvocationContext::stdio())
        .await
        .unwrap_err();

    assert!(matches!(err, InvocationError::Timeout(limit) if limit == Duration::from_millis(50)));
}

#[tokio::test]
async fn test_toolset_scope_rejects_outside_tools() {
    let ctx = TestContext::new();
    let scoped = InvocationContext::stdio().with_toolset("ordered");

    assert!(ctx.dispatcher().invoke("alpha", json!({}), &scoped).await.is_ok());
    let err = ctx
        .dispatcher()
        .invoke("run-query", json!({"query": "SELECT 1"}), &scoped)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tool_not_found");
}

#[tokio::test]
async fn test_reload_swaps_for_new_invocations_only() {
    let ctx = TestContext::new();
    let held = ctx.registry.snapshot().await;

    let replacement = load(
        r#"
sources:
  fleet-db:
    kind: postgres
    database: fleet
tools:
  only-tool:
    kind: sql
    source: fleet-db
    statement: SELECT 3
"#,
        Arc::new(RecordingSource::new()),
    );
    ctx.registry.swap(replacement).await;

    // A snapshot taken before the swap stays complete.
    assert!(held.get("run-query").is_ok());
    assert!(held.get("only-tool").is_err());

    let err = ctx
        .dispatcher()
        .invoke("run-query", json!({"query": "SELECT 1"}), &InvocationContext::stdio())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tool_not_found");
    assert!(
        ctx.dispatcher()
            .invoke("only-tool", json!({}), &InvocationContext::stdio())
            .await
            .is_ok()
    );
}
