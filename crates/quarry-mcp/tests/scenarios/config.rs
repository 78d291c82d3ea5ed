//! Load-time validation scenarios.

use crate::common::{FLEET, RecordingSource, TestContext};
use quarry_core::{ConfigError, QuarryConfig};
use quarry_mcp::{DataSource, Registry};
use std::sync::Arc;

fn try_load(yaml: &str) -> Result<Registry, ConfigError> {
    let config = QuarryConfig::from_yaml_with(yaml, |_| None)?;
    Registry::load_with(&config, |_, _| {
        Ok(Arc::new(RecordingSource::new()) as Arc<dyn DataSource>)
    })
}

#[test]
fn test_undeclared_placeholder_is_config_error() {
    let yaml = r#"
sources:
  db:
    kind: postgres
    database: fleet
tools:
  broken:
    kind: postgres-sql
    source: db
    statement: "SELECT * FROM {{.missing}}"
"#;
    let err = try_load(yaml).err().unwrap();
    assert!(matches!(err, ConfigError::Invalid { ref location, .. } if location == "tools.broken"));
    assert!(err.to_string().contains("{{.missing}}"));
}

#[test]
fn test_bound_parameter_used_as_placeholder_is_config_error() {
    // Declaring `query` as a bound parameter while the statement references
    // `{{.query}}` must never load: it would otherwise run text with no value.
    let yaml = r#"
sources:
  db:
    kind: postgres
    database: fleet
tools:
  run-query:
    kind: postgres-sql
    source: db
    statement: "{{.query}}"
    parameters:
      - name: query
        type: string
"#;
    let err = try_load(yaml).err().unwrap();
    assert!(err.to_string().contains("does not name a template parameter"));
}

#[test]
fn test_whole_config_rejected_on_one_bad_tool() {
    let yaml = format!(
        "{}  broken:\n    kind: postgres-sql\n    source: fleet-db\n    statement: \"{{{{.nope}}}}\"\n",
        FLEET.replace("\ntoolsets:\n  ordered: [zeta, alpha]\n", "\n")
    );
    assert!(try_load(&yaml).is_err());
}

#[test]
fn test_missing_environment_variable() {
    let yaml = r#"
sources:
  db:
    kind: postgres
    password: ${FLEET_DB_PASSWORD}
"#;
    let err = QuarryConfig::from_yaml_with(yaml, |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnv { ref name } if name == "FLEET_DB_PASSWORD"));
}

#[tokio::test]
async fn test_toolset_order_independent_of_declaration() {
    let ctx = TestContext::new();
    let snapshot = ctx.registry.snapshot().await;

    let names: Vec<_> = snapshot
        .resolve_toolset("ordered")
        .unwrap()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tools.yaml");
    std::fs::write(&path, FLEET).unwrap();

    let config = QuarryConfig::from_file(&path).unwrap();
    assert_eq!(config.tools.len(), 9);
    assert_eq!(config.toolsets["ordered"], vec!["zeta", "alpha"]);
}
