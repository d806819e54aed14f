// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-based loading and layering tests for `mgx-config`.

use mgx_config::{
    ConfigError, ConfigWarning, ResilienceConfig, apply_overrides_from, load_config,
    merge_configs, validate_config,
};
use std::fs;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn layered_files_then_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let base = write(
        &dir,
        "base.toml",
        r#"
environment = "ci"
version = "1.4.0"

[backoff]
max_retries = 3
initial_delay_ms = 100
"#,
    );
    let local = write(
        &dir,
        "local.toml",
        r#"
[backoff]
initial_delay_ms = 20

[metrics]
top_errors = 5
"#,
    );

    let mut cfg = merge_configs(
        load_config(Some(&base)).unwrap(),
        load_config(Some(&local)).unwrap(),
    );
    apply_overrides_from(&mut cfg, |k| (k == "MGX_VERSION").then(|| "1.5.0".to_string()));

    assert_eq!(cfg.environment.as_deref(), Some("ci"));
    assert_eq!(cfg.version.as_deref(), Some("1.5.0"));
    assert_eq!(cfg.backoff.max_retries(), 3);
    assert_eq!(cfg.backoff.initial_delay_ms(), 20);
    assert_eq!(cfg.metrics.top_errors(), 5);
    assert!(validate_config(&cfg).unwrap().is_empty());
}

#[test]
fn malformed_file_reports_parse_error_with_detail() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "bad.toml", "[backoff\nmax_retries = 3");
    match load_config(Some(&path)).unwrap_err() {
        ConfigError::ParseError { reason } => assert!(!reason.is_empty()),
        other => panic!("expected ParseError, got {other:?}"),
    }
}

#[test]
fn unknown_keys_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "extra.toml", "environment = \"dev\"\nnotify = true\n");
    let cfg = load_config(Some(&path)).unwrap();
    assert_eq!(cfg.environment.as_deref(), Some("dev"));
}

#[test]
fn warnings_render_for_humans() {
    let warnings = validate_config(&ResilienceConfig::default()).unwrap();
    let rendered: Vec<String> = warnings.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec!["missing optional field 'environment': errors will not carry an environment"]
    );
    assert!(matches!(
        warnings[0],
        ConfigWarning::MissingOptionalField { .. }
    ));
}

#[test]
fn validation_error_lists_reasons() {
    let mut cfg = ResilienceConfig::default();
    cfg.backoff.multiplier = Some(0.9);
    let err = validate_config(&cfg).unwrap_err();
    assert!(err.to_string().starts_with("config validation failed"));
    assert!(err.to_string().contains("multiplier 0.9"));
}
