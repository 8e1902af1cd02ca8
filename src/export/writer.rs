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

//! # Sink Writers
//!
//! This module provides chunked writing of row streams into a delimited file
//! or a store table.
//!
//! A sink is driven as `prepare` → `write_chunk`* → `finish`. Each chunk is
//! committed as a unit, and a failure mid-stream leaves the chunks already
//! committed in place; nothing is rolled back.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use serde::Serialize;

use crate::codec::FlowDelimitedCodec;
use crate::endpoint::{validate_table_identifier, FlowFileEndpoint, FlowFileWriter};
use crate::errors::{FlowError, Result};
use crate::record::FlowRow;
use crate::schema::{FlowColumn, FlowColumnType, FlowSchema};
use crate::store::{FlowRowStream, FlowStoreSession};

/// Outcome of [`FlowSinkWriter::write`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowWriteReport {
    /// Rows in chunks the sink confirmed.
    pub rows_written: usize,
    /// Number of confirmed chunks.
    pub chunks_written: usize,
    /// First failure, if the stream did not complete.
    pub error: Option<FlowError>,
}

impl FlowWriteReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Pulls up to `chunk_size` rows from `rows`.
///
/// A chunk shorter than `chunk_size` means the stream is exhausted. Rows
/// read before an error are dropped with the error.
pub async fn next_chunk(rows: &mut FlowRowStream, chunk_size: usize) -> Result<Vec<FlowRow>> {
    let mut chunk = Vec::with_capacity(chunk_size);
    while chunk.len() < chunk_size {
        match rows.next().await {
            Some(row) => chunk.push(row?),
            None => break,
        }
    }
    Ok(chunk)
}

/// Polymorphic row sink.
#[async_trait]
pub trait FlowSinkWriter: Send {
    /// Name used in status messages.
    fn describe(&self) -> String;

    /// Called once with the projected schema before the first chunk.
    async fn prepare(&mut self, schema: &FlowSchema) -> Result<()>;

    /// Commits one chunk, returning the number of rows written.
    async fn write_chunk(&mut self, rows: &[FlowRow]) -> Result<usize>;

    /// Flushes and releases the destination.
    async fn finish(&mut self) -> Result<()>;

    /// Consumes `rows` in chunks of `chunk_size`.
    async fn write(&mut self, schema: &FlowSchema, mut rows: FlowRowStream, chunk_size: usize) -> FlowWriteReport {
        let mut report = FlowWriteReport::default();
        if let Err(err) = self.prepare(schema).await {
            report.error = Some(err);
            return report;
        }

        let chunk_size = chunk_size.max(1);
        loop {
            let chunk = match next_chunk(&mut rows, chunk_size).await {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => chunk,
                Err(err) => {
                    report.error = Some(err);
                    return report;
                }
            };
            match self.write_chunk(&chunk).await {
                Ok(written) => {
                    report.rows_written += written;
                    report.chunks_written += 1;
                }
                Err(err) => {
                    report.error = Some(err);
                    return report;
                }
            }
            if chunk.len() < chunk_size {
                break;
            }
        }

        if let Err(err) = self.finish().await {
            report.error = Some(err);
        }
        report
    }
}

/// Writes rows to a delimited file.
pub struct FlowFileSink {
    file: FlowFileEndpoint,
    codec: Option<FlowDelimitedCodec>,
    writer: Option<FlowFileWriter>,
    columns: Vec<String>,
}

impl FlowFileSink {
    pub fn new(file: FlowFileEndpoint) -> Self {
        Self {
            file,
            codec: None,
            writer: None,
            columns: Vec::new(),
        }
    }
}

#[async_trait]
impl FlowSinkWriter for FlowFileSink {
    fn describe(&self) -> String {
        self.file.handle.name()
    }

    async fn prepare(&mut self, schema: &FlowSchema) -> Result<()> {
        self.file.validate()?;
        let codec = FlowDelimitedCodec::for_file(&self.file)?;
        let mut writer = self.file.handle.open_write()?;
        self.columns = schema.names();
        if codec.has_header() {
            writer.write_all(&codec.encode_header(&self.columns)?)?;
            writer.flush()?;
        }
        debug!("writing {} columns to {}", self.columns.len(), self.describe());
        self.codec = Some(codec);
        self.writer = Some(writer);
        Ok(())
    }

    async fn write_chunk(&mut self, rows: &[FlowRow]) -> Result<usize> {
        let (codec, writer) = match (self.codec.as_ref(), self.writer.as_mut()) {
            (Some(codec), Some(writer)) => (codec, writer),
            _ => return Err(FlowError::internal("file sink used before prepare")),
        };
        let bytes = codec.encode_rows(&self.columns, rows)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(rows.len())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }
}

/// Inserts rows into a store table, creating it when absent.
pub struct FlowStoreSink {
    session: Arc<dyn FlowStoreSession>,
    table: String,
    schema: Option<FlowSchema>,
}

impl FlowStoreSink {
    pub fn new(session: Arc<dyn FlowStoreSession>, table: impl Into<String>) -> Self {
        Self {
            session,
            table: table.into(),
            schema: None,
        }
    }

    /// Every incoming column must exist in `existing` with a compatible type.
    fn check_compatible(&self, existing: &FlowSchema, incoming: &FlowSchema) -> Result<()> {
        for column in incoming.columns() {
            match existing.column(&column.name) {
                None => {
                    return Err(FlowError::schema_mismatch(format!(
                        "column '{}' does not exist in table {}",
                        column.name, self.table
                    )))
                }
                Some(found) if !found.inferred_type.is_compatible_with(column.inferred_type) => {
                    return Err(FlowError::schema_mismatch(format!(
                        "column '{}' is {} in table {} but {} in the source",
                        column.name,
                        found.inferred_type.as_str(),
                        self.table,
                        column.inferred_type.as_str()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FlowSinkWriter for FlowStoreSink {
    fn describe(&self) -> String {
        format!("{}.{}", self.session.endpoint().database, self.table)
    }

    async fn prepare(&mut self, schema: &FlowSchema) -> Result<()> {
        validate_table_identifier(&self.table)?;
        let tables = self.session.list_tables().await?;
        if tables.iter().any(|t| *t == self.table) {
            let existing = self.session.list_columns(&self.table).await?;
            self.check_compatible(&existing, schema)?;
            debug!("appending to existing table {}", self.describe());
        } else {
            let columns = schema
                .columns()
                .iter()
                .map(|c| match c.inferred_type {
                    FlowColumnType::Unknown => FlowColumn::new(c.name.clone(), FlowColumnType::String),
                    other => FlowColumn::new(c.name.clone(), other),
                })
                .collect();
            let created = FlowSchema::new(columns)?;
            self.session.create_table(&self.table, &created).await?;
            debug!("created table {}", self.describe());
        }
        self.schema = Some(schema.clone());
        Ok(())
    }

    async fn write_chunk(&mut self, rows: &[FlowRow]) -> Result<usize> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| FlowError::internal("store sink used before prepare"))?;
        let written = self.session.insert(&self.table, schema, rows).await?;
        if written != rows.len() {
            warn!(
                "store confirmed {written} of {} rows for {}",
                rows.len(),
                self.describe()
            );
        }
        Ok(written)
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
