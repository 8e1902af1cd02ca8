//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.

use std::io::Write;

use fileflow::{FlowConfig, FlowConfigBuilder, FlowError};
use log::LevelFilter;
use serde_json::json;

#[test]
fn test_defaults() {
    let config = FlowConfig::default();
    assert_eq!(config.engine.chunk_size, 1000);
    assert_eq!(config.engine.sample_rows, 5);
    assert_eq!(config.log.level_filter(), LevelFilter::Info);
    assert!(config.store.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_yaml_with_store() {
    let config = FlowConfig::from_yaml_str(
        "engine:\n  chunk_size: 250\nlog:\n  level: debug\nstore:\n  host: localhost\n  port: 8123\n  database: analytics\n  username: loader\n  credential: s3cret\n",
    )
    .unwrap();
    assert_eq!(config.engine.chunk_size, 250);
    assert_eq!(config.engine.sample_rows, 5);
    assert_eq!(config.log.level_filter(), LevelFilter::Debug);

    let store = config.store.unwrap();
    assert_eq!(store.database, "analytics");
    assert_eq!(store.credential.expose_secret(), "s3cret");
    assert!(store.table.is_none());
    assert!(!store.secure);
}

#[test]
fn test_credential_is_never_serialized() {
    let config = FlowConfig::from_json_str(
        r#"{"store": {"host": "h", "port": 9000, "database": "d", "username": "u", "credential": "topsecret"}}"#,
    )
    .unwrap();
    let text = serde_json::to_string(&config).unwrap();
    assert!(!text.contains("topsecret"));
    assert!(text.contains("***"));
    assert!(!format!("{config:?}").contains("topsecret"));
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let err = FlowConfig::from_yaml_str("engine:\n  chunk_size: 0\n").unwrap_err();
    assert!(matches!(err, FlowError::Validation { .. }));
}

#[test]
fn test_from_path_by_extension() {
    let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    writeln!(yaml, "engine:\n  preview_rows: 3").unwrap();
    let config = FlowConfig::from_path(yaml.path()).unwrap();
    assert_eq!(config.engine.preview_rows, 3);

    let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(json_file, "{}", json!({"engine": {"sample_rows": 10}})).unwrap();
    assert_eq!(FlowConfig::from_path(json_file.path()).unwrap().engine.sample_rows, 10);

    let toml = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    assert!(matches!(
        FlowConfig::from_path(toml.path()),
        Err(FlowError::Validation { .. })
    ));
}

#[test]
fn test_builder_merges_over_defaults() {
    let config = FlowConfigBuilder::from_json(&json!({"chunk_size": 64, "log_level": "warn"}));
    assert_eq!(config.engine.chunk_size, 64);
    assert_eq!(config.engine.sample_rows, 5);
    assert_eq!(config.log.level_filter(), LevelFilter::Warn);

    let fallback = FlowConfigBuilder::from_json(&json!({"chunk_size": "many"}));
    assert_eq!(fallback, FlowConfig::default());
}
