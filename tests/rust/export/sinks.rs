//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.

use std::fs;

use fileflow::{
    FlowColumn, FlowColumnType, FlowError, FlowErrorKind, FlowFileEndpoint, FlowFileSink, FlowMemoryStore,
    FlowRow, FlowRowStream, FlowSchema, FlowSinkWriter, FlowStoreConnector, FlowStoreEndpoint, FlowStoreSink,
    FlowValue, Result,
};
use futures::stream::{self, StreamExt};

fn endpoint() -> FlowStoreEndpoint {
    FlowStoreEndpoint::new("localhost", 8123, "default", "loader", "secret")
}

fn schema() -> FlowSchema {
    FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Integer),
        FlowColumn::new("label", FlowColumnType::Unknown),
    ])
    .unwrap()
}

fn rows(count: i64) -> FlowRowStream {
    let rows: Vec<Result<FlowRow>> = (1..=count)
        .map(|i| Ok(FlowRow::new().with("id", i).with("label", format!("row {i}"))))
        .collect();
    stream::iter(rows).boxed()
}

#[tokio::test]
async fn test_store_sink_creates_missing_table() {
    let store = FlowMemoryStore::new();
    let session = store.connect(&endpoint()).await.unwrap();
    let mut sink = FlowStoreSink::new(session, "events");

    let report = sink.write(&schema(), rows(5), 2).await;
    assert!(report.is_complete());
    assert_eq!(report.rows_written, 5);
    assert_eq!(report.chunks_written, 3);
    assert_eq!(store.insert_calls(), 3);

    let created = store.table_schema("default", "events").unwrap();
    assert_eq!(created.type_of("id"), FlowColumnType::Integer);
    assert_eq!(created.type_of("label"), FlowColumnType::String);

    let stored = store.table_rows("default", "events").unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[4].get("label"), Some(&FlowValue::from("row 5")));
}

#[tokio::test]
async fn test_store_sink_appends_to_compatible_table() {
    let store = FlowMemoryStore::new();
    let existing = FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Integer),
        FlowColumn::new("label", FlowColumnType::String),
        FlowColumn::new("extra", FlowColumnType::Date),
    ])
    .unwrap();
    store
        .seed_table("default", "events", existing, &[FlowRow::new().with("id", 0i64)])
        .unwrap();
    let session = store.connect(&endpoint()).await.unwrap();

    let report = FlowStoreSink::new(session, "events").write(&schema(), rows(2), 10).await;
    assert!(report.is_complete());
    let stored = store.table_rows("default", "events").unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].get("extra"), Some(&FlowValue::Null));
}

#[tokio::test]
async fn test_store_sink_rejects_incompatible_table() {
    let store = FlowMemoryStore::new();
    let existing = FlowSchema::new(vec![
        FlowColumn::new("id", FlowColumnType::Date),
        FlowColumn::new("label", FlowColumnType::String),
    ])
    .unwrap();
    store.seed_table("default", "events", existing, &[]).unwrap();
    let session = store.connect(&endpoint()).await.unwrap();

    let report = FlowStoreSink::new(session.clone(), "events").write(&schema(), rows(3), 10).await;
    assert!(matches!(report.error, Some(FlowError::SchemaMismatch { .. })));
    assert_eq!(report.rows_written, 0);
    assert_eq!(store.insert_calls(), 0);

    let narrow = FlowSchema::new(vec![FlowColumn::new("id", FlowColumnType::Date)]).unwrap();
    store.seed_table("default", "narrow", narrow, &[]).unwrap();
    let report = FlowStoreSink::new(session, "narrow").write(&schema(), rows(3), 10).await;
    assert_eq!(report.error.map(|e| e.kind()), Some(FlowErrorKind::SchemaMismatch));
}

#[tokio::test]
async fn test_store_sink_rejects_bad_table_name() {
    let store = FlowMemoryStore::new();
    let session = store.connect(&endpoint()).await.unwrap();
    let report = FlowStoreSink::new(session, "drop table").write(&schema(), rows(1), 10).await;
    assert_eq!(report.error.map(|e| e.kind()), Some(FlowErrorKind::Validation));
    assert!(store.table_rows("default", "drop table").is_err());
}

#[tokio::test]
async fn test_failed_insert_keeps_committed_chunks() {
    let store = FlowMemoryStore::new();
    store.fail_inserts_after(Some(1));
    let session = store.connect(&endpoint()).await.unwrap();

    let report = FlowStoreSink::new(session, "events").write(&schema(), rows(5), 2).await;
    assert_eq!(report.rows_written, 2);
    assert_eq!(report.chunks_written, 1);
    assert_eq!(report.error.map(|e| e.kind()), Some(FlowErrorKind::Io));
    assert_eq!(store.row_count("default", "events"), 2);
}

#[tokio::test]
async fn test_file_sink_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("events.tsv");
    let file = FlowFileEndpoint::path(&path).with_delimiter('\t').with_header(false);

    let report = FlowFileSink::new(file).write(&schema(), rows(2), 1).await;
    assert!(report.is_complete());
    assert_eq!(report.chunks_written, 2);
    assert_eq!(fs::read_to_string(&path).unwrap(), "1\trow 1\n2\trow 2\n");
}

#[tokio::test]
async fn test_file_sink_truncates_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.csv");
    fs::write(&path, "stale content that is longer than the output\n").unwrap();

    let report = FlowFileSink::new(FlowFileEndpoint::path(&path)).write(&schema(), rows(1), 10).await;
    assert!(report.is_complete());
    assert_eq!(fs::read_to_string(&path).unwrap(), "id,label\n1,row 1\n");
}

#[cfg(feature = "compression")]
#[tokio::test]
async fn test_compressed_file_sinks_are_complete_after_finish() {
    use std::io::Read;

    let dir = tempfile::tempdir().unwrap();
    for name in ["events.csv.gz", "events.csv.zst"] {
        let out = dir.path().join(name);
        let mut sink = FlowFileSink::new(FlowFileEndpoint::path(&out));
        let report = sink.write(&schema(), rows(300), 50).await;
        assert!(report.is_complete(), "{name}: {:?}", report.error);
        assert_eq!(report.chunks_written, 6);

        let compressed = fs::read(&out).unwrap();
        let mut text = String::new();
        if name.ends_with(".gz") {
            flate2::read::GzDecoder::new(compressed.as_slice())
                .read_to_string(&mut text)
                .unwrap();
        } else {
            text = String::from_utf8(zstd::stream::decode_all(compressed.as_slice()).unwrap()).unwrap();
        }
        assert_eq!(text.lines().count(), 301, "{name}");
        assert!(text.starts_with("id,label\n1,row 1\n"));
        assert!(text.ends_with("300,row 300\n"));
        drop(sink);
    }
}
