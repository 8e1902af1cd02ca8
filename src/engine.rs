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

//! # FileFlow Transfer Engine
//!
//! The engine owns the store session, the schema cache and the single active
//! transfer job. A transfer moves through
//! `Idle → Validating → Transferring → {Completed, Failed}`:
//!
//! - **Validating** checks the request without any I/O. A failure here
//!   never touches the sink and leaves `rows_processed` at zero.
//! - **Transferring** resolves sessions, fetches the source schema, prepares
//!   the sink and then moves rows chunk by chunk. `rows_processed` grows
//!   only after the sink confirms a chunk.
//!
//! Cancellation abandons a chunk that is still being filled. A chunk already
//! handed to the sink finishes and is counted.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use fileflow::engine::{FlowTransferEngine, FlowTransferRequest};
//! use fileflow::store::FlowMemoryStore;
//!
//! let engine = FlowTransferEngine::new(Arc::new(FlowMemoryStore::new()));
//! engine.connect(&store_endpoint).await?;
//! let schema = engine.infer_from_file(&file)?;
//! let job = engine
//!     .start_transfer(FlowTransferRequest::new(file.into(), table.into(), FlowProjection::all(&schema)))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{FlowConfig, FlowEngineConfig};
use crate::endpoint::{FlowEndpoint, FlowFileEndpoint, FlowStoreEndpoint};
use crate::errors::{FlowError, Result};
use crate::export::{next_chunk, FlowFileSink, FlowSinkWriter, FlowStoreSink};
use crate::ingest::{FlowFileSource, FlowPreview, FlowSchemaInferencer, FlowSourceReader, FlowStoreSource};
use crate::metrics::FlowTransferMetrics;
use crate::schema::{FlowProjection, FlowSchema};
use crate::status::{FlowConnectionStatus, FlowStatusBoard, FlowStatusSnapshot, FlowTransferPhase};
use crate::store::{FlowRowStream, FlowStoreConnector, FlowStoreSession};

/// What the caller asks the engine to move.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowTransferRequest {
    pub source: FlowEndpoint,
    pub sink: FlowEndpoint,
    pub projection: FlowProjection,
}

impl FlowTransferRequest {
    pub fn new(source: FlowEndpoint, sink: FlowEndpoint, projection: FlowProjection) -> Self {
        Self {
            source,
            sink,
            projection,
        }
    }
}

/// One run of the engine with its own counters.
#[derive(Clone, Debug)]
pub struct FlowTransferJob {
    pub id: u64,
    pub source: FlowEndpoint,
    pub sink: FlowEndpoint,
    pub projection: FlowProjection,
    pub phase: FlowTransferPhase,
    pub rows_processed: usize,
    pub chunks_committed: usize,
    pub error: Option<FlowError>,
    pub message: String,
    pub metrics: FlowTransferMetrics,
}

impl FlowTransferJob {
    fn new(id: u64, request: &FlowTransferRequest) -> Self {
        Self {
            id,
            source: request.source.clone(),
            sink: request.sink.clone(),
            projection: request.projection.clone(),
            phase: FlowTransferPhase::Validating,
            rows_processed: 0,
            chunks_committed: 0,
            error: None,
            message: String::new(),
            metrics: FlowTransferMetrics::start(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase == FlowTransferPhase::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.phase == FlowTransferPhase::Failed
    }
}

/// Progress reported after every committed chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowTransferProgress {
    pub job_id: u64,
    pub rows_processed: usize,
    pub chunks_committed: usize,
}

pub type FlowProgressCallback = Arc<dyn Fn(&FlowTransferProgress) + Send + Sync>;

/// Step of a transfer named in failure messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowTransferStage {
    Validating,
    Connecting,
    FetchingSchema,
    Transferring,
}

impl fmt::Display for FlowTransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowTransferStage::Validating => "validating",
            FlowTransferStage::Connecting => "connecting",
            FlowTransferStage::FetchingSchema => "fetching schema",
            FlowTransferStage::Transferring => "transferring",
        })
    }
}

struct FlowActiveTransfer {
    id: u64,
    token: CancellationToken,
    endpoints: Vec<String>,
}

/// Releases the active-transfer slot when the job ends, however it ends.
struct FlowActiveGuard<'a> {
    slot: &'a Mutex<Option<FlowActiveTransfer>>,
}

impl Drop for FlowActiveGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives schema discovery and chunked transfers between endpoints.
pub struct FlowTransferEngine {
    connector: Arc<dyn FlowStoreConnector>,
    config: FlowEngineConfig,
    inferencer: FlowSchemaInferencer,
    status: FlowStatusBoard,
    session: Mutex<Option<Arc<dyn FlowStoreSession>>>,
    schema_cache: Mutex<HashMap<String, FlowSchema>>,
    active: Mutex<Option<FlowActiveTransfer>>,
    last_job: Mutex<Option<FlowTransferJob>>,
    next_job_id: AtomicU64,
    progress: Option<FlowProgressCallback>,
}

impl FlowTransferEngine {
    pub fn new(connector: Arc<dyn FlowStoreConnector>) -> Self {
        let config = FlowEngineConfig::default();
        Self {
            connector,
            inferencer: FlowSchemaInferencer::new(config.sample_rows).with_preview_rows(config.preview_rows),
            config,
            status: FlowStatusBoard::new(),
            session: Mutex::new(None),
            schema_cache: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            last_job: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: FlowEngineConfig) -> Self {
        self.inferencer = FlowSchemaInferencer::new(config.sample_rows).with_preview_rows(config.preview_rows);
        self.config = config;
        self
    }

    /// Called after every committed chunk.
    pub fn with_progress_callback(mut self, callback: FlowProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Engine configured from a loaded [`FlowConfig`]; applies the log level.
    pub fn from_config(config: &FlowConfig, connector: Arc<dyn FlowStoreConnector>) -> Result<Self> {
        config.validate()?;
        config.log.apply();
        Ok(Self::new(connector).with_config(config.engine.clone()))
    }

    /// Engine talking to ClickHouse with the connector settings of `config`.
    #[cfg(feature = "clickhouse")]
    pub fn clickhouse(config: &FlowConfig) -> Result<Self> {
        let connector = crate::store::FlowClickHouseConnector::new(config.clickhouse.clone())?;
        Self::from_config(config, Arc::new(connector))
    }

    pub fn config(&self) -> &FlowEngineConfig {
        &self.config
    }

    // ---- status -------------------------------------------------------

    pub fn status(&self) -> FlowStatusSnapshot {
        self.status.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowStatusSnapshot> {
        self.status.subscribe()
    }

    pub fn last_job(&self) -> Option<FlowTransferJob> {
        lock(&self.last_job).clone()
    }

    pub fn is_transferring(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Clears the last job and the transfer status. Rejected while a job runs.
    pub fn reset(&self) -> Result<()> {
        if self.is_transferring() {
            return Err(FlowError::validation("cannot reset while a transfer is running"));
        }
        *lock(&self.last_job) = None;
        self.status.reset();
        Ok(())
    }

    // ---- connection ---------------------------------------------------

    /// Opens the engine's store session.
    pub async fn connect(&self, endpoint: &FlowStoreEndpoint) -> Result<()> {
        if let Err(err) = endpoint.validate_connection() {
            self.status.connection_failed(&err);
            return Err(err);
        }
        self.status.set_connection(
            FlowConnectionStatus::Connecting,
            format!("Connecting to {}:{}...", endpoint.host, endpoint.port),
        );
        info!("connecting to {} via {}", endpoint.session_key(), self.connector.name());
        match self.connector.connect(endpoint).await {
            Ok(session) => {
                *lock(&self.session) = Some(session);
                self.status.set_connection(
                    FlowConnectionStatus::Connected,
                    format!("Connected to {}:{}/{}", endpoint.host, endpoint.port, endpoint.database),
                );
                Ok(())
            }
            Err(err) => {
                warn!("connection to {} failed: {}", endpoint.session_key(), err.reason());
                *lock(&self.session) = None;
                self.status.connection_failed(&err);
                Err(err)
            }
        }
    }

    pub fn disconnect(&self) {
        if lock(&self.session).take().is_some() {
            info!("disconnected");
        }
        self.status.set_connection(FlowConnectionStatus::Idle, "Disconnected");
    }

    pub fn session(&self) -> Option<Arc<dyn FlowStoreSession>> {
        lock(&self.session).clone()
    }

    fn connected_session(&self) -> Result<Arc<dyn FlowStoreSession>> {
        self.session()
            .ok_or_else(|| FlowError::validation("not connected to a store"))
    }

    /// Reuses the engine session when it serves `endpoint`, else connects.
    async fn session_for(&self, endpoint: &FlowStoreEndpoint) -> Result<Arc<dyn FlowStoreSession>> {
        if let Some(session) = self.session() {
            if session.endpoint().same_session(endpoint) {
                return Ok(session);
            }
        }
        debug!("opening a dedicated session for {}", endpoint.session_key());
        self.connector.connect(endpoint).await
    }

    // ---- schema discovery ---------------------------------------------

    /// Table names of the connected database.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let session = self.connected_session()?;
        let tables = self.inferencer.infer_from_store(session.as_ref()).await?;
        self.status.update(|s| {
            if !s.phase.is_active() {
                s.message = format!("Loaded {} tables", tables.len());
            }
        });
        Ok(tables)
    }

    fn ensure_not_in_use(&self, key: &str) -> Result<()> {
        if let Some(active) = lock(&self.active).as_ref() {
            if active.endpoints.iter().any(|k| k == key) {
                return Err(FlowError::validation(format!(
                    "endpoint is in use by transfer {}",
                    active.id
                )));
            }
        }
        Ok(())
    }

    fn cached_schema(&self, key: &str) -> Option<FlowSchema> {
        lock(&self.schema_cache).get(key).cloned()
    }

    fn cache_schema(&self, key: String, schema: &FlowSchema) {
        lock(&self.schema_cache).insert(key, schema.clone());
    }

    /// Drops the cached schema of `endpoint`; the next inference reads again.
    pub fn invalidate_schema(&self, endpoint: &FlowEndpoint) -> bool {
        lock(&self.schema_cache).remove(&endpoint.key()).is_some()
    }

    /// Schema of any endpoint, cached per endpoint identity.
    pub async fn infer_endpoint(&self, endpoint: &FlowEndpoint) -> Result<FlowSchema> {
        let key = endpoint.key();
        self.ensure_not_in_use(&key)?;
        endpoint.validate_as_source()?;
        if let Some(schema) = self.cached_schema(&key) {
            return Ok(schema);
        }
        let schema = match endpoint {
            FlowEndpoint::File(file) => self.inferencer.infer_from_file(file)?,
            FlowEndpoint::Store(store) => {
                let session = self.session_for(store).await?;
                let table = store.validate_table()?;
                self.inferencer.infer_table(session.as_ref(), table).await?
            }
            FlowEndpoint::Query(query) => {
                let session = self.session_for(&query.store).await?;
                self.inferencer.infer_query(session.as_ref(), &query.sql).await?
            }
        };
        self.cache_schema(key, &schema);
        Ok(schema)
    }

    pub fn infer_from_file(&self, file: &FlowFileEndpoint) -> Result<FlowSchema> {
        let key = FlowEndpoint::File(file.clone()).key();
        self.ensure_not_in_use(&key)?;
        file.validate()?;
        if let Some(schema) = self.cached_schema(&key) {
            return Ok(schema);
        }
        let schema = self.inferencer.infer_from_file(file)?;
        self.cache_schema(key, &schema);
        Ok(schema)
    }

    /// Schema of `table` in the connected database.
    pub async fn infer_from_store(&self, table: &str) -> Result<FlowSchema> {
        let session = self.connected_session()?;
        let endpoint = FlowEndpoint::Store(session.endpoint().clone().with_table(table));
        self.infer_endpoint(&endpoint).await
    }

    pub fn preview_file(&self, file: &FlowFileEndpoint) -> Result<FlowPreview> {
        self.ensure_not_in_use(&FlowEndpoint::File(file.clone()).key())?;
        file.validate()?;
        self.inferencer.preview_file(file)
    }

    pub async fn preview_table(&self, table: &str, projection: Option<&FlowProjection>) -> Result<FlowPreview> {
        let session = self.connected_session()?;
        let endpoint = FlowEndpoint::Store(session.endpoint().clone().with_table(table));
        self.ensure_not_in_use(&endpoint.key())?;
        self.inferencer.preview_table(session.as_ref(), table, projection).await
    }

    // ---- transfer -----------------------------------------------------

    /// Requests cancellation of the running transfer.
    pub fn cancel_transfer(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(active) => {
                info!("cancelling transfer {}", active.id);
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs one transfer to its terminal phase.
    ///
    /// Returns `Err` only when another transfer is already running; every
    /// other failure is reported through the returned job.
    pub async fn start_transfer(&self, request: FlowTransferRequest) -> Result<FlowTransferJob> {
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if let Some(running) = active.as_ref() {
                return Err(FlowError::validation(format!(
                    "transfer {} is already running",
                    running.id
                )));
            }
            *active = Some(FlowActiveTransfer {
                id,
                token: token.clone(),
                endpoints: vec![request.source.key(), request.sink.key()],
            });
        }
        let _guard = FlowActiveGuard { slot: &self.active };

        let mut job = FlowTransferJob::new(id, &request);
        job.message = "Validating transfer...".to_string();
        self.status.begin_job(job.message.clone());
        *lock(&self.last_job) = Some(job.clone());
        info!(
            "transfer {id}: {} -> {} ({} columns)",
            request.source.describe(),
            request.sink.describe(),
            request.projection.len()
        );

        let mut stage = FlowTransferStage::Validating;
        let outcome = match self.validate(&request) {
            Ok(()) => self.run(&mut job, &request, &token, &mut stage).await,
            Err(err) => Err(err),
        };

        job.metrics.finish();
        match outcome {
            Ok(()) => {
                job.phase = FlowTransferPhase::Completed;
                job.message = format!(
                    "Successfully transferred {} rows to {}",
                    job.rows_processed,
                    request.sink.describe()
                );
                self.status.set_phase(FlowTransferPhase::Completed, job.message.clone());
                info!("transfer {id} completed: {} rows", job.rows_processed);
            }
            Err(err) => {
                job.phase = FlowTransferPhase::Failed;
                job.message = match &err {
                    FlowError::Cancelled { .. } => {
                        format!("Transfer cancelled after {} rows", job.rows_processed)
                    }
                    other => format!("Transfer failed while {stage}: {}", other.reason()),
                };
                warn!("transfer {id} failed while {stage}: {err}");
                self.status.job_failed(&err, job.message.clone());
                job.error = Some(err);
            }
        }

        *lock(&self.last_job) = Some(job.clone());
        Ok(job)
    }

    /// Request checks that need no I/O.
    fn validate(&self, request: &FlowTransferRequest) -> Result<()> {
        if request.projection.is_empty() {
            return Err(FlowError::validation("at least one column must be selected"));
        }
        request.source.validate_as_source()?;
        request.sink.validate_as_destination()?;
        if request.source.key() == request.sink.key() {
            return Err(FlowError::validation("source and destination must differ"));
        }
        if let Some(schema) = self.cached_schema(&request.source.key()) {
            request.projection.validate_against(&schema)?;
        }
        Ok(())
    }

    fn announce(&self, job: &mut FlowTransferJob, phase: FlowTransferPhase, message: String) {
        job.phase = phase;
        job.message = message.clone();
        self.status.set_phase(phase, message);
    }

    fn check_cancelled(&self, token: &CancellationToken, job: &FlowTransferJob) -> Result<()> {
        if token.is_cancelled() {
            return Err(FlowError::cancelled(format!(
                "transfer cancelled after {} rows",
                job.rows_processed
            )));
        }
        Ok(())
    }

    async fn open_source(&self, endpoint: &FlowEndpoint) -> Result<Box<dyn FlowSourceReader>> {
        let cached = self.cached_schema(&endpoint.key());
        let source: Box<dyn FlowSourceReader> = match endpoint {
            FlowEndpoint::File(file) => {
                let source = FlowFileSource::new(file.clone()).with_inferencer(self.inferencer.clone());
                Box::new(match cached {
                    Some(schema) => source.with_schema(schema),
                    None => source,
                })
            }
            FlowEndpoint::Store(store) => {
                let session = self.session_for(store).await?;
                let source = FlowStoreSource::table(session, store.validate_table()?);
                Box::new(match cached {
                    Some(schema) => source.with_schema(schema),
                    None => source,
                })
            }
            FlowEndpoint::Query(query) => {
                let session = self.session_for(&query.store).await?;
                let source = FlowStoreSource::query(session, query.sql.clone());
                Box::new(match cached {
                    Some(schema) => source.with_schema(schema),
                    None => source,
                })
            }
        };
        Ok(source)
    }

    async fn open_sink(&self, endpoint: &FlowEndpoint) -> Result<Box<dyn FlowSinkWriter>> {
        match endpoint {
            FlowEndpoint::File(file) => Ok(Box::new(FlowFileSink::new(file.clone()))),
            FlowEndpoint::Store(store) => {
                let table = store.validate_table()?.to_string();
                let session = self.session_for(store).await?;
                Ok(Box::new(FlowStoreSink::new(session, table)))
            }
            FlowEndpoint::Query(_) => Err(FlowError::validation(
                "a query can only be used as a transfer source",
            )),
        }
    }

    async fn run(
        &self,
        job: &mut FlowTransferJob,
        request: &FlowTransferRequest,
        token: &CancellationToken,
        stage: &mut FlowTransferStage,
    ) -> Result<()> {
        *stage = FlowTransferStage::Connecting;
        if request.source.store().is_some() || request.sink.store().is_some() {
            let target = request
                .source
                .store()
                .or_else(|| request.sink.store())
                .map(|s| format!("{}:{}", s.host, s.port))
                .unwrap_or_default();
            self.announce(job, FlowTransferPhase::Transferring, format!("Connecting to {target}..."));
        } else {
            self.announce(job, FlowTransferPhase::Transferring, "Opening files...".to_string());
        }
        let source = self.open_source(&request.source).await?;
        let mut sink = self.open_sink(&request.sink).await?;
        self.check_cancelled(token, job)?;

        *stage = FlowTransferStage::FetchingSchema;
        self.announce(
            job,
            FlowTransferPhase::Transferring,
            format!("Fetching schema of {}...", source.describe()),
        );
        let schema = source.schema().await?;
        self.cache_schema(request.source.key(), &schema);
        let projected = schema.project(&request.projection)?;
        self.check_cancelled(token, job)?;

        *stage = FlowTransferStage::Transferring;
        sink.prepare(&projected).await?;
        let rows = source.rows(&request.projection).await?;
        self.announce(
            job,
            FlowTransferPhase::Transferring,
            format!("Transferring: {} rows", job.rows_processed),
        );

        match self.pump(job, rows, sink.as_mut(), token).await {
            Ok(()) => sink.finish().await,
            Err(err) => {
                if let Err(finish_err) = sink.finish().await {
                    debug!("sink cleanup after failure: {finish_err}");
                }
                Err(err)
            }
        }
    }

    /// Moves rows chunk by chunk until the source is exhausted.
    async fn pump(
        &self,
        job: &mut FlowTransferJob,
        mut rows: FlowRowStream,
        sink: &mut dyn FlowSinkWriter,
        token: &CancellationToken,
    ) -> Result<()> {
        let chunk_size = self.config.chunk_size.max(1);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(FlowError::cancelled(format!(
                        "transfer cancelled after {} rows",
                        job.rows_processed
                    )));
                }
                chunk = next_chunk(&mut rows, chunk_size) => chunk?,
            };
            if chunk.is_empty() {
                break;
            }
            job.metrics.record_read(chunk.len());
            let exhausted = chunk.len() < chunk_size;

            let written = sink.write_chunk(&chunk).await?;
            job.rows_processed += written;
            job.chunks_committed += 1;
            job.metrics.record_chunk(written);
            job.message = format!("Transferring: {} rows", job.rows_processed);
            self.status.set_progress(job.rows_processed);
            if let Some(callback) = &self.progress {
                callback(&FlowTransferProgress {
                    job_id: job.id,
                    rows_processed: job.rows_processed,
                    chunks_committed: job.chunks_committed,
                });
            }
            debug!("transfer {}: committed chunk {} ({written} rows)", job.id, job.chunks_committed);

            if exhausted {
                break;
            }
            self.check_cancelled(token, job)?;
        }
        Ok(())
    }
}
