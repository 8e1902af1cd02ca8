//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.

use std::sync::Arc;
use std::time::Duration;

use fileflow::{
    FlowColumn, FlowColumnType, FlowEngineConfig, FlowError, FlowErrorKind, FlowFileEndpoint, FlowMemoryStore,
    FlowProjection, FlowRow, FlowSchema, FlowSharedBuffer, FlowStoreEndpoint, FlowTransferEngine,
    FlowTransferPhase, FlowTransferRequest,
};

fn endpoint() -> FlowStoreEndpoint {
    FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "secret")
}

fn engine(store: &FlowMemoryStore, chunk_size: usize) -> Arc<FlowTransferEngine> {
    Arc::new(FlowTransferEngine::new(Arc::new(store.clone())).with_config(FlowEngineConfig {
        chunk_size,
        ..FlowEngineConfig::default()
    }))
}

fn numbers_file(count: usize) -> FlowFileEndpoint {
    let mut text = String::from("n,label\n");
    for i in 0..count {
        text.push_str(&format!("{i},item {i}\n"));
    }
    FlowFileEndpoint::buffer(FlowSharedBuffer::from_bytes(text))
}

fn request(file: &FlowFileEndpoint, table: &str) -> FlowTransferRequest {
    FlowTransferRequest::new(
        file.clone().into(),
        endpoint().with_table(table).into(),
        FlowProjection::new(["n", "label"]),
    )
}

#[tokio::test]
async fn test_cancel_stops_at_chunk_boundary() {
    let store = FlowMemoryStore::new();
    store.set_insert_delay(Some(Duration::from_millis(20)));
    let engine = engine(&store, 10);
    engine.connect(&endpoint()).await.unwrap();
    let file = numbers_file(100);

    let mut status = engine.subscribe();
    let running = {
        let engine = engine.clone();
        let request = request(&file, "numbers");
        tokio::spawn(async move { engine.start_transfer(request).await })
    };

    let _ = status.wait_for(|s| s.rows_processed >= 10).await.unwrap();
    assert!(engine.cancel_transfer());

    let job = running.await.unwrap().unwrap();
    assert!(job.is_failed());
    assert!(matches!(job.error, Some(FlowError::Cancelled { .. })));
    assert_eq!(job.rows_processed % 10, 0);
    assert!(job.rows_processed >= 10 && job.rows_processed < 100);
    assert_eq!(job.rows_processed, store.row_count("default", "numbers"));
    assert_eq!(job.message, format!("Transfer cancelled after {} rows", job.rows_processed));

    let snapshot = engine.status();
    assert_eq!(snapshot.phase, FlowTransferPhase::Failed);
    assert_eq!(snapshot.error.map(|e| e.kind), Some(FlowErrorKind::Cancelled));
    assert!(!engine.is_transferring());
}

#[tokio::test]
async fn test_cancel_while_filling_commits_nothing() {
    let store = FlowMemoryStore::new();
    let schema = FlowSchema::new(vec![FlowColumn::new("n", FlowColumnType::Integer)]).unwrap();
    let rows: Vec<FlowRow> = (0..100i64).map(|i| FlowRow::new().with("n", i)).collect();
    store.seed_table("default", "numbers", schema, &rows).unwrap();
    store.set_row_delay(Some(Duration::from_millis(5)));

    let engine = engine(&store, 1000);
    engine.connect(&endpoint()).await.unwrap();
    let buffer = FlowSharedBuffer::new();
    let running = {
        let engine = engine.clone();
        let request = FlowTransferRequest::new(
            endpoint().with_table("numbers").into(),
            FlowFileEndpoint::buffer(buffer.clone()).into(),
            FlowProjection::new(["n"]),
        );
        tokio::spawn(async move { engine.start_transfer(request).await })
    };

    let mut status = engine.subscribe();
    let _ = status
        .wait_for(|s| s.message.starts_with("Transferring"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(engine.cancel_transfer());

    let job = running.await.unwrap().unwrap();
    assert_eq!(job.error.map(|e| e.kind()), Some(FlowErrorKind::Cancelled));
    assert_eq!(job.rows_processed, 0);
    assert_eq!(job.chunks_committed, 0);
    assert_eq!(buffer.to_string_lossy(), "n\n");
}

#[tokio::test]
async fn test_second_transfer_is_rejected_while_running() {
    let store = FlowMemoryStore::new();
    store.set_insert_delay(Some(Duration::from_millis(20)));
    let engine = engine(&store, 5);
    engine.connect(&endpoint()).await.unwrap();
    let file = numbers_file(50);

    let mut status = engine.subscribe();
    let running = {
        let engine = engine.clone();
        let request = request(&file, "first");
        tokio::spawn(async move { engine.start_transfer(request).await })
    };
    let _ = status.wait_for(|s| s.rows_processed >= 5).await.unwrap();

    let err = engine.start_transfer(request(&numbers_file(3), "second")).await.unwrap_err();
    assert_eq!(err.kind(), FlowErrorKind::Validation);
    assert!(!store.has_table("default", "second"));

    let err = engine.infer_from_file(&file).unwrap_err();
    assert_eq!(err.kind(), FlowErrorKind::Validation);
    assert!(engine.reset().is_err());

    assert!(engine.cancel_transfer());
    let job = running.await.unwrap().unwrap();
    assert_eq!(job.phase, FlowTransferPhase::Failed);

    let job = engine.start_transfer(request(&numbers_file(3), "second")).await.unwrap();
    assert!(job.is_completed(), "{}", job.message);
    assert_eq!(store.row_count("default", "second"), 3);
}

#[test]
fn test_cancel_without_transfer_is_noop() {
    let store = FlowMemoryStore::new();
    let engine = engine(&store, 10);
    assert!(!engine.cancel_transfer());
    assert!(engine.last_job().is_none());
}
