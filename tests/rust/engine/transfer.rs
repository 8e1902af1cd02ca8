//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.

use std::fs;
use std::sync::{Arc, Mutex};

use fileflow::{
    FlowColumn, FlowColumnType, FlowConnectionStatus, FlowEndpoint, FlowEngineConfig, FlowErrorKind,
    FlowFileEndpoint, FlowMemoryStore, FlowProjection, FlowQueryEndpoint, FlowRow, FlowSchema, FlowSharedBuffer,
    FlowStoreEndpoint, FlowTransferEngine, FlowTransferPhase, FlowTransferProgress, FlowTransferRequest,
    FlowTransferStatus, FlowValue,
};

fn endpoint() -> FlowStoreEndpoint {
    FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "secret")
}

fn engine(store: &FlowMemoryStore, chunk_size: usize) -> FlowTransferEngine {
    FlowTransferEngine::new(Arc::new(store.clone())).with_config(FlowEngineConfig {
        chunk_size,
        ..FlowEngineConfig::default()
    })
}

fn people_file() -> FlowFileEndpoint {
    FlowFileEndpoint::buffer(FlowSharedBuffer::from_bytes(
        "id,name,age\n1,Ann,34\n2,Bob,27\n3,Cy,41\n",
    ))
}

fn all_columns(engine: &FlowTransferEngine, file: &FlowFileEndpoint) -> FlowProjection {
    FlowProjection::all(&engine.infer_from_file(file).unwrap())
}

#[tokio::test]
async fn test_file_to_store_reports_progress_per_chunk() {
    let store = FlowMemoryStore::new();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    let engine = engine(&store, 1).with_progress_callback(Arc::new(move |p: &FlowTransferProgress| {
        seen.lock().unwrap().push(p.rows_processed);
    }));
    engine.connect(&endpoint()).await.unwrap();

    let file = people_file();
    let projection = all_columns(&engine, &file);
    let job = engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("people").into(),
            projection,
        ))
        .await
        .unwrap();

    assert!(job.is_completed(), "{}", job.message);
    assert_eq!(job.rows_processed, 3);
    assert_eq!(job.chunks_committed, 3);
    assert_eq!(job.message, "Successfully transferred 3 rows to default.people");
    assert_eq!(*progress.lock().unwrap(), vec![1, 2, 3]);

    let status = engine.status();
    assert_eq!(status.transfer, FlowTransferStatus::Completed);
    assert_eq!(status.rows_processed, 3);
    assert_eq!(status.connection, FlowConnectionStatus::Connected);

    assert_eq!(store.insert_calls(), 3);
    let stored = store.table_rows("default", "people").unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].get("age"), Some(&FlowValue::Integer(41)));
    assert_eq!(store.table_schema("default", "people").unwrap().type_of("age"), FlowColumnType::Integer);
    assert_eq!(store.connect_count(), 1);
}

#[tokio::test]
async fn test_invalid_table_name_fails_validation() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    engine.connect(&endpoint()).await.unwrap();

    let file = people_file();
    let projection = all_columns(&engine, &file);
    let job = engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("1bad").into(),
            projection,
        ))
        .await
        .unwrap();

    assert!(job.is_failed());
    assert_eq!(job.rows_processed, 0);
    assert_eq!(job.error.as_ref().map(|e| e.kind()), Some(FlowErrorKind::Validation));
    assert!(job.message.starts_with("Transfer failed while validating"), "{}", job.message);
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(store.connect_count(), 1);

    let status = engine.status();
    assert_eq!(status.transfer, FlowTransferStatus::Failed);
    assert_eq!(status.error.map(|e| e.kind), Some(FlowErrorKind::Validation));
}

#[tokio::test]
async fn test_empty_projection_leaves_sink_untouched() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.csv");
    fs::write(&out, "keep me\n").unwrap();

    let job = engine
        .start_transfer(FlowTransferRequest::new(
            people_file().into(),
            FlowFileEndpoint::path(&out).into(),
            FlowProjection::default(),
        ))
        .await
        .unwrap();

    assert_eq!(job.error.map(|e| e.kind()), Some(FlowErrorKind::Validation));
    assert_eq!(job.rows_processed, 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "keep me\n");
}

#[tokio::test]
async fn test_unknown_column_is_rejected_before_io() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    engine.connect(&endpoint()).await.unwrap();
    let file = people_file();
    engine.infer_from_file(&file).unwrap();

    let job = engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("people").into(),
            FlowProjection::new(["id", "salary"]),
        ))
        .await
        .unwrap();

    assert_eq!(job.error.map(|e| e.kind()), Some(FlowErrorKind::Validation));
    assert!(job.message.contains("validating"), "{}", job.message);
    assert!(!store.has_table("default", "people"));
}

#[tokio::test]
async fn test_insert_failure_keeps_committed_rows() {
    let store = FlowMemoryStore::new();
    store.fail_inserts_after(Some(2));
    let engine = engine(&store, 1);
    engine.connect(&endpoint()).await.unwrap();

    let file = FlowFileEndpoint::buffer(FlowSharedBuffer::from_bytes("n\n1\n2\n3\n4\n5\n"));
    let projection = all_columns(&engine, &file);
    let job = engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("numbers").into(),
            projection,
        ))
        .await
        .unwrap();

    assert!(job.is_failed());
    assert_eq!(job.rows_processed, 2);
    assert_eq!(job.error.as_ref().map(|e| e.kind()), Some(FlowErrorKind::Io));
    assert!(job.message.starts_with("Transfer failed while transferring"), "{}", job.message);
    assert_eq!(store.row_count("default", "numbers"), 2);

    let status = engine.status();
    assert_eq!(status.phase, FlowTransferPhase::Failed);
    assert_eq!(status.rows_processed, 2);
    assert!(!engine.is_transferring());
}

#[tokio::test]
async fn test_store_to_file_export_quotes_values() {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Integer),
        FlowColumn::new("name", FlowColumnType::String),
        FlowColumn::new("score", FlowColumnType::Float),
    ])
    .unwrap();
    let rows = vec![
        FlowRow::new().with("id", 1i64).with("name", "Smith, Ann").with("score", 1.5f64),
        FlowRow::new().with("id", 2i64).with("name", "say \"hi\"").with("score", FlowValue::Null),
    ];
    store.seed_table("default", "people", schema, &rows).unwrap();

    let engine = engine(&store, 1);
    engine.connect(&endpoint()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("people.csv");

    let job = engine
        .start_transfer(FlowTransferRequest::new(
            endpoint().with_table("people").into(),
            FlowFileEndpoint::path(&out).into(),
            FlowProjection::new(["name", "id", "score"]),
        ))
        .await
        .unwrap();

    assert!(job.is_completed(), "{}", job.message);
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "name,id,score\n\"Smith, Ann\",1,1.5\n\"say \"\"hi\"\"\",2,\n"
    );
    assert_eq!(job.metrics.rows_written, 2);
}

#[tokio::test]
async fn test_single_column_nulls_survive_export_and_import() {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![FlowColumn::new("note", FlowColumnType::String)]).unwrap();
    let rows = vec![
        FlowRow::new().with("note", "a"),
        FlowRow::new().with("note", FlowValue::Null),
        FlowRow::new().with("note", "b"),
    ];
    store.seed_table("default", "notes", schema, &rows).unwrap();

    let engine = engine(&store, 2);
    engine.connect(&endpoint()).await.unwrap();
    let buffer = FlowSharedBuffer::new();
    let exported = engine
        .start_transfer(FlowTransferRequest::new(
            endpoint().with_table("notes").into(),
            FlowFileEndpoint::buffer(buffer.clone()).into(),
            FlowProjection::new(["note"]),
        ))
        .await
        .unwrap();
    assert!(exported.is_completed(), "{}", exported.message);
    assert_eq!(buffer.to_string_lossy(), "note\na\n\"\"\nb\n");

    let file = FlowFileEndpoint::buffer(buffer);
    let imported = engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("copy").into(),
            FlowProjection::new(["note"]),
        ))
        .await
        .unwrap();
    assert!(imported.is_completed(), "{}", imported.message);
    assert_eq!(imported.rows_processed, 3);
    assert_eq!(store.table_rows("default", "copy").unwrap().len(), 3);
}

#[tokio::test]
async fn test_query_source_exports_result() {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Integer),
        FlowColumn::new("city", FlowColumnType::String),
    ])
    .unwrap();
    let rows: Vec<FlowRow> = (1..=4i64)
        .map(|i| FlowRow::new().with("id", i).with("city", format!("c{i}")))
        .collect();
    store.seed_table("default", "weather", schema, &rows).unwrap();

    let engine = engine(&store, 2);
    engine.connect(&endpoint()).await.unwrap();
    let query: FlowEndpoint = FlowQueryEndpoint::new(endpoint(), "SELECT * FROM `weather` LIMIT 3").into();
    let schema = engine.infer_endpoint(&query).await.unwrap();
    assert_eq!(schema.names(), vec!["id", "city"]);

    let buffer = FlowSharedBuffer::new();
    let job = engine
        .start_transfer(FlowTransferRequest::new(
            query,
            FlowFileEndpoint::buffer(buffer.clone()).into(),
            FlowProjection::new(["city"]),
        ))
        .await
        .unwrap();
    assert!(job.is_completed(), "{}", job.message);
    assert_eq!(buffer.to_string_lossy(), "city\nc1\nc2\nc3\n");
    assert_eq!(store.connect_count(), 1);
}

#[tokio::test]
async fn test_store_to_store_reuses_session() {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![FlowColumn::new("v", FlowColumnType::Float)]).unwrap();
    let rows: Vec<FlowRow> = (0..7).map(|i| FlowRow::new().with("v", i as f64)).collect();
    store.seed_table("default", "src", schema, &rows).unwrap();

    let engine = engine(&store, 3);
    engine.connect(&endpoint()).await.unwrap();
    let job = engine
        .start_transfer(FlowTransferRequest::new(
            endpoint().with_table("src").into(),
            endpoint().with_table("dst").into(),
            FlowProjection::new(["v"]),
        ))
        .await
        .unwrap();

    assert!(job.is_completed(), "{}", job.message);
    assert_eq!(job.chunks_committed, 3);
    assert_eq!(store.row_count("default", "dst"), 7);
    assert_eq!(store.connect_count(), 1);
}

#[tokio::test]
async fn test_same_source_and_sink_is_rejected() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    let file = people_file();
    let projection = all_columns(&engine, &file);
    let job = engine
        .start_transfer(FlowTransferRequest::new(file.clone().into(), file.into(), projection))
        .await
        .unwrap();
    assert_eq!(job.error.map(|e| e.kind()), Some(FlowErrorKind::Validation));
}

#[tokio::test]
async fn test_connect_failure_hides_credential() {
    let store = FlowMemoryStore::new().with_credentials("loader", "right-secret");
    let engine = engine(&store, 10);
    let bad = FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "wrong-secret");

    let err = engine.connect(&bad).await.unwrap_err();
    assert_eq!(err.kind(), FlowErrorKind::Connection);
    assert!(!err.to_string().contains("wrong-secret"));

    let status = engine.status();
    assert_eq!(status.connection, FlowConnectionStatus::Failed);
    let headline = status.headline().unwrap();
    assert!(headline.starts_with("Connection failed"), "{headline}");
    assert!(!format!("{status:?}").contains("wrong-secret"));
    assert!(!format!("{bad:?}").contains("wrong-secret"));
    assert!(engine.list_tables().await.is_err());

    let incomplete = FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "");
    let err = engine.connect(&incomplete).await.unwrap_err();
    assert_eq!(err.kind(), FlowErrorKind::Validation);
    assert_eq!(store.connect_count(), 0);
}

#[tokio::test]
async fn test_reset_keeps_connection() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    engine.connect(&endpoint()).await.unwrap();
    let file = people_file();
    let projection = all_columns(&engine, &file);
    engine
        .start_transfer(FlowTransferRequest::new(
            file.into(),
            endpoint().with_table("people").into(),
            projection,
        ))
        .await
        .unwrap();
    assert!(engine.last_job().is_some());

    engine.reset().unwrap();
    assert!(engine.last_job().is_none());
    let status = engine.status();
    assert_eq!(status.transfer, FlowTransferStatus::Idle);
    assert_eq!(status.rows_processed, 0);
    assert_eq!(status.connection, FlowConnectionStatus::Connected);

    engine.disconnect();
    assert_eq!(engine.status().connection, FlowConnectionStatus::Idle);
    assert!(engine.session().is_none());
}
