//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # FileFlow Core Library
//!
//! FileFlow moves tabular data between delimited flat files and a columnar
//! analytical store. It discovers schemas, previews data, lets the caller
//! pick columns and streams the selected rows in chunks while reporting
//! progress.
//!
//! ## Module Overview
//!
//! - **errors**: `FlowError` and its classification
//! - **record**: `FlowValue` and `FlowRow`, the typed cells and rows moved around
//! - **schema**: column types, schemas and projections
//! - **endpoint**: file, store and query endpoints with their validation
//! - **codec**: delimited text parsing and serialization
//! - **store**: the store session seam, an in-process store and the ClickHouse client
//! - **ingest**: schema inference, previews and source readers
//! - **export**: chunked sink writers
//! - **status**: observable connection and transfer status
//! - **metrics**: per-job throughput counters
//! - **config**: YAML/JSON configuration
//! - **engine**: the transfer engine tying it all together
//!
//! ## Feature Flags
//!
//! - `clickhouse`: ClickHouse HTTP connector (reqwest)
//! - `compression`: gzip and zstd file handles
//! - `full`: enables all features (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use fileflow::{FlowFileEndpoint, FlowMemoryStore, FlowProjection, FlowStoreEndpoint};
//! use fileflow::{FlowTransferEngine, FlowTransferRequest};
//!
//! let engine = FlowTransferEngine::new(Arc::new(FlowMemoryStore::new()));
//! let store = FlowStoreEndpoint::new("localhost", 8123, "default", "default", "secret");
//! engine.connect(&store).await?;
//!
//! let file = FlowFileEndpoint::path("people.csv");
//! let schema = engine.infer_from_file(&file)?;
//! let request = FlowTransferRequest::new(
//!     file.into(),
//!     store.with_table("people").into(),
//!     FlowProjection::all(&schema),
//! );
//! let job = engine.start_transfer(request).await?;
//! println!("{}", job.message);
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FlowError>`. Failures inside a transfer
//! are reported on the returned job and through the status channel instead.

pub mod errors;
pub mod record;
pub mod schema;
pub mod endpoint;
pub mod codec;
pub mod store;
pub mod ingest;
pub mod export;
pub mod status;
pub mod metrics;
pub mod config;
pub mod engine;

pub use errors::{FlowError, FlowErrorKind, Result};
pub use record::{FlowRow, FlowRowBatch, FlowValue};
pub use schema::{FlowColumn, FlowColumnType, FlowProjection, FlowSchema};
pub use endpoint::{
    FlowCredential, FlowEndpoint, FlowFileEndpoint, FlowFileHandle, FlowFileWriter, FlowQueryEndpoint,
    FlowSharedBuffer, FlowStoreEndpoint,
};
pub use codec::FlowDelimitedCodec;
pub use store::{FlowJoinQueryBuilder, FlowMemoryStore, FlowRowStream, FlowStoreConnector, FlowStoreSession};
#[cfg(feature = "clickhouse")]
pub use store::{FlowClickHouseAuth, FlowClickHouseConfig, FlowClickHouseConnector};
pub use ingest::{FlowFileSource, FlowPreview, FlowSchemaInferencer, FlowSourceReader, FlowStoreSource};
pub use export::{FlowFileSink, FlowSinkWriter, FlowStoreSink, FlowWriteReport};
pub use status::{
    FlowConnectionStatus, FlowStatusBoard, FlowStatusError, FlowStatusSnapshot, FlowTransferPhase,
    FlowTransferStatus,
};
pub use metrics::FlowTransferMetrics;
pub use config::{FlowConfig, FlowConfigBuilder, FlowEngineConfig, FlowLogConfig};
pub use engine::{
    FlowProgressCallback, FlowTransferEngine, FlowTransferJob, FlowTransferProgress, FlowTransferRequest,
};
