//! Integration tests for configuration loading and validation

use recall_core::config::{load, load_from_json, load_from_yaml, ConfigError, ValidationErrorKind};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    env::set_var("RECALL_TEST_YAML_KEY", "sk-from-env");

    let yaml = r#"
version: "0.1"
upstream:
  name: openrouter
  base_url: https://openrouter.ai/api/v1
  api_key: ${RECALL_TEST_YAML_KEY}
  app_url: https://recall.example.com
  app_title: Recall
  request_timeout_ms: 30000
  retry:
    max_attempts: 5
    initial_delay_ms: 250
enrichment:
  max_context_tokens: 2000
  top_k: 8
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    let config = load_from_yaml(&path).unwrap();
    assert_eq!(config.upstream.name, "openrouter");
    assert_eq!(config.upstream.api_key.expose_secret(), "sk-from-env");
    assert_eq!(config.upstream.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.upstream.stream_timeout(), Duration::from_secs(300));
    assert_eq!(config.upstream.retry.max_attempts, 5);
    assert_eq!(config.upstream.retry.initial_delay_ms, 250);
    assert_eq!(config.enrichment.max_context_tokens, 2000);
    assert_eq!(config.enrichment.top_k, 8);
    assert_eq!(config.enrichment.candidate_pool_size(), 32);

    env::remove_var("RECALL_TEST_YAML_KEY");
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
  "version": "0.1",
  "upstream": {
    "base_url": "https://api.openai.com/v1",
    "api_key": "sk-literal"
  }
}"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.json", json);

    let config = load_from_json(&path).unwrap();
    assert_eq!(config.upstream.base_url, "https://api.openai.com/v1");
    assert_eq!(config.enrichment.top_k, 5);

    let by_extension = load(&path).unwrap();
    assert_eq!(by_extension.upstream.base_url, config.upstream.base_url);
}

#[test]
fn test_missing_env_var() {
    let yaml = r#"
version: "0.1"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: ${RECALL_TEST_DEFINITELY_UNSET}
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "RECALL_TEST_DEFINITELY_UNSET"),
        other => panic!("Expected EnvVarNotFound, got {:?}", other),
    }
}

#[test]
fn test_unsupported_version() {
    let yaml = r#"
version: "2.0"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: sk-test
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "version");
            assert!(matches!(err.kind, ValidationErrorKind::InvalidVersion { .. }));
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
}

#[test]
fn test_invalid_retry_policy() {
    let yaml = r#"
version: "0.1"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: sk-test
  retry:
    max_attempts: 0
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => {
            assert_eq!(err.field_path, "upstream.retry.max_attempts")
        }
        other => panic!("Expected validation error, got {:?}", other),
    }
}

#[test]
fn test_zero_top_k_rejected() {
    let yaml = r#"
version: "0.1"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: sk-test
enrichment:
  top_k: 0
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    match load_from_yaml(&path) {
        Err(ConfigError::ValidationError(err)) => assert_eq!(err.field_path, "enrichment.top_k"),
        other => panic!("Expected validation error, got {:?}", other),
    }
}

#[test]
fn test_parse_error_reports_location() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", "version: \"0.1\"\nupstream: [unclosed\n");

    match load_from_yaml(&path) {
        Err(ConfigError::ParseError { line, .. }) => assert!(line.is_some()),
        other => panic!("Expected parse error, got {:?}", other),
    }
}

#[test]
fn test_missing_file() {
    let err = load_from_yaml("/nonexistent/recall.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::IoError { .. }));
}

#[test]
fn test_api_key_never_printed() {
    let yaml = r#"
version: "0.1"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: sk-very-secret-value
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    let config = load_from_yaml(&path).unwrap();
    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-very-secret-value"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn test_credential_header_from_env_loads() {
    env::set_var("RECALL_TEST_SESSION_TOKEN", "tok-123");

    let yaml = r#"
version: "0.1"
upstream:
  base_url: https://openrouter.ai/api/v1
  api_key: sk-test
  extra_headers:
    X-Session-Token: ${RECALL_TEST_SESSION_TOKEN}
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "recall.yaml", yaml);

    let config = load_from_yaml(&path).unwrap();
    assert_eq!(
        config.upstream.extra_headers.get("X-Session-Token").map(String::as_str),
        Some("tok-123")
    );

    env::remove_var("RECALL_TEST_SESSION_TOKEN");
}
