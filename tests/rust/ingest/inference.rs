//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.

use std::fs;
use std::sync::Arc;

use fileflow::{
    FlowColumn, FlowColumnType, FlowError, FlowFileEndpoint, FlowMemoryStore, FlowProjection, FlowRow,
    FlowSchema, FlowSchemaInferencer, FlowSharedBuffer, FlowStoreConnector, FlowStoreEndpoint, FlowValue,
};

fn endpoint() -> FlowStoreEndpoint {
    FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "secret")
}

fn seeded_store() -> FlowMemoryStore {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Integer),
        FlowColumn::new("city", FlowColumnType::String),
        FlowColumn::new("temp", FlowColumnType::Float),
    ])
    .unwrap();
    let rows: Vec<FlowRow> = (1..=8i64)
        .map(|i| {
            FlowRow::new()
                .with("id", i)
                .with("city", format!("city{i}"))
                .with("temp", i as f64 / 2.0)
        })
        .collect();
    store.seed_table("default", "weather", schema, &rows).unwrap();
    store
}

#[test]
fn test_infer_types_from_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(
        &path,
        "id,name,score,joined,note\n1,Ann,3,2024-01-01,\n2,Bob,4.5,2024-02-01,\n3,Cy,5,2024-03-01,\n",
    )
    .unwrap();

    let inferencer = FlowSchemaInferencer::default();
    let schema = inferencer.infer_from_file(&FlowFileEndpoint::path(&path)).unwrap();
    assert_eq!(schema.names(), vec!["id", "name", "score", "joined", "note"]);
    assert_eq!(schema.type_of("id"), FlowColumnType::Integer);
    assert_eq!(schema.type_of("name"), FlowColumnType::String);
    assert_eq!(schema.type_of("score"), FlowColumnType::Float);
    assert_eq!(schema.type_of("joined"), FlowColumnType::Date);
    assert_eq!(schema.type_of("note"), FlowColumnType::Unknown);
}

#[test]
fn test_sample_is_bounded() {
    let mut text = String::from("code\n");
    for i in 0..5 {
        text.push_str(&format!("{i}\n"));
    }
    text.push_str("A7\n");
    let file = FlowFileEndpoint::buffer(FlowSharedBuffer::from_bytes(text));

    let schema = FlowSchemaInferencer::new(5).infer_from_file(&file).unwrap();
    assert_eq!(schema.type_of("code"), FlowColumnType::Integer);

    let schema = FlowSchemaInferencer::new(6).infer_from_file(&file).unwrap();
    assert_eq!(schema.type_of("code"), FlowColumnType::String);
}

#[test]
fn test_preview_coerces_values() {
    let file = FlowFileEndpoint::buffer(FlowSharedBuffer::from_bytes("a;b\n1;x\n2;y\n3;z\n"))
        .with_delimiter(';');
    let preview = FlowSchemaInferencer::new(5)
        .with_preview_rows(2)
        .preview_file(&file)
        .unwrap();
    assert_eq!(preview.schema.type_of("a"), FlowColumnType::Integer);
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.rows[1].get("a"), Some(&FlowValue::Integer(2)));
    assert_eq!(preview.rows[1].get("b"), Some(&FlowValue::from("y")));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = FlowFileEndpoint::path(dir.path().join("absent.csv"));
    let err = FlowSchemaInferencer::default().infer_from_file(&file).unwrap_err();
    assert!(matches!(err, FlowError::Io(_)));
}

#[test]
fn test_empty_file_is_format_error() {
    let file = FlowFileEndpoint::buffer(FlowSharedBuffer::new());
    let err = FlowSchemaInferencer::default().infer_from_file(&file).unwrap_err();
    assert!(matches!(err, FlowError::Format { .. }));
}

#[cfg(feature = "compression")]
#[test]
fn test_gzip_file_is_read_transparently() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv.gz");
    let file = FlowFileEndpoint::path(&path);
    {
        let mut writer = file.handle.open_write().unwrap();
        writer.write_all(b"id,label\n1,one\n2,two\n").unwrap();
        writer.finish().unwrap();
    }
    let preview = FlowSchemaInferencer::default().preview_file(&file).unwrap();
    assert_eq!(preview.schema.type_of("id"), FlowColumnType::Integer);
    assert_eq!(preview.rows.len(), 2);
}

#[tokio::test]
async fn test_store_tables_and_columns() {
    let store = seeded_store();
    let session = store.connect(&endpoint()).await.unwrap();
    let inferencer = FlowSchemaInferencer::default();

    let tables = inferencer.infer_from_store(session.as_ref()).await.unwrap();
    assert_eq!(tables, vec!["weather"]);

    let schema = inferencer.infer_table(session.as_ref(), "weather").await.unwrap();
    assert_eq!(schema.names(), vec!["id", "city", "temp"]);
    assert_eq!(schema.type_of("temp"), FlowColumnType::Float);

    let err = inferencer.infer_table(session.as_ref(), "9lives").await.unwrap_err();
    assert!(matches!(err, FlowError::Validation { .. }));
}

#[tokio::test]
async fn test_preview_table_respects_projection_and_limit() {
    let store = seeded_store();
    let session = store.connect(&endpoint()).await.unwrap();
    let inferencer = FlowSchemaInferencer::default();

    let projection = FlowProjection::new(["temp", "id"]);
    let preview = inferencer
        .preview_table(session.as_ref(), "weather", Some(&projection))
        .await
        .unwrap();
    assert_eq!(preview.schema.names(), vec!["temp", "id"]);
    assert_eq!(preview.rows.len(), 5);
    assert_eq!(preview.rows[0].len(), 2);
    assert_eq!(preview.rows[0].get("temp"), Some(&FlowValue::Float(0.5)));
}

#[tokio::test]
async fn test_query_schema() {
    let store = seeded_store();
    let session = store.connect(&endpoint()).await.unwrap();
    let schema = FlowSchemaInferencer::default()
        .infer_query(session.as_ref(), "SELECT `city` FROM `weather` LIMIT 2")
        .await
        .unwrap();
    assert_eq!(schema.names(), vec!["city"]);
}

#[tokio::test]
async fn test_engine_store_inference_is_idempotent() {
    let store = seeded_store();
    let engine = fileflow::FlowTransferEngine::new(Arc::new(store.clone()));
    engine.connect(&endpoint()).await.unwrap();

    let first = engine.infer_from_store("weather").await.unwrap();
    let second = engine.infer_from_store("weather").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(engine.list_tables().await.unwrap(), vec!["weather"]);
}
