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

//! # Schema Inference
//!
//! Derives column names and coarse type hints from a bounded sample of a
//! source. Files are read up to the header plus `sample_rows` data rows;
//! stores are asked for their catalog instead of sampling data.

use futures::TryStreamExt;
use log::debug;
use serde::Serialize;

use crate::codec::FlowDelimitedCodec;
use crate::endpoint::{validate_table_identifier, FlowFileEndpoint};
use crate::errors::Result;
use crate::record::{FlowRow, FlowValue};
use crate::schema::{FlowColumn, FlowColumnType, FlowProjection, FlowSchema};
use crate::store::query::select_columns_sql;
use crate::store::FlowStoreSession;

/// Default number of data rows sampled for type hints.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// A schema together with the first few typed rows of a source.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowPreview {
    pub schema: FlowSchema,
    pub rows: Vec<FlowRow>,
}

/// Schema inference over files and store catalogs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowSchemaInferencer {
    sample_rows: usize,
    preview_rows: usize,
}

impl Default for FlowSchemaInferencer {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            preview_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl FlowSchemaInferencer {
    pub fn new(sample_rows: usize) -> Self {
        Self {
            sample_rows,
            ..Self::default()
        }
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    pub fn sample_rows(&self) -> usize {
        self.sample_rows
    }

    pub fn preview_rows(&self) -> usize {
        self.preview_rows
    }

    /// Reads the header and first `count` data rows as untyped text.
    fn sample_file(&self, file: &FlowFileEndpoint, count: usize) -> Result<(FlowSchema, Vec<FlowRow>)> {
        let codec = FlowDelimitedCodec::for_file(file)?;
        let reader = file.handle.open_read()?;
        let (schema, rows) = codec.parse_reader(reader)?;
        let sample = rows.take(count).collect::<Result<Vec<_>>>()?;
        Ok((schema, sample))
    }

    fn type_schema(&self, schema: &FlowSchema, sample: &[FlowRow]) -> Result<FlowSchema> {
        let columns = schema
            .columns()
            .iter()
            .map(|column| {
                let inferred = sample
                    .iter()
                    .take(self.sample_rows)
                    .filter_map(|row| row.get(&column.name))
                    .map(|value| FlowColumnType::infer_text(&value.as_text()))
                    .fold(FlowColumnType::Unknown, FlowColumnType::merge);
                FlowColumn::new(column.name.clone(), inferred)
            })
            .collect();
        FlowSchema::new(columns)
    }

    /// Header names plus type hints from at most `sample_rows` data rows.
    pub fn infer_from_file(&self, file: &FlowFileEndpoint) -> Result<FlowSchema> {
        let (schema, sample) = self.sample_file(file, self.sample_rows)?;
        let typed = self.type_schema(&schema, &sample)?;
        debug!(
            "inferred {} columns from {} sampled rows of {}",
            typed.len(),
            sample.len(),
            file.handle.name()
        );
        Ok(typed)
    }

    /// Inferred schema and the first `preview_rows` rows coerced to it.
    pub fn preview_file(&self, file: &FlowFileEndpoint) -> Result<FlowPreview> {
        let (schema, sample) = self.sample_file(file, self.sample_rows.max(self.preview_rows))?;
        let typed = self.type_schema(&schema, &sample)?;
        let rows = sample
            .into_iter()
            .take(self.preview_rows)
            .map(|row| {
                row.iter()
                    .map(|(name, value)| {
                        let coerced = FlowValue::from_text(&value.as_text(), typed.type_of(name));
                        (name.to_string(), coerced)
                    })
                    .collect()
            })
            .collect();
        Ok(FlowPreview { schema: typed, rows })
    }

    /// Table names of the session's database.
    pub async fn infer_from_store(&self, session: &dyn FlowStoreSession) -> Result<Vec<String>> {
        session.list_tables().await
    }

    /// Column names and types of one table, from the store catalog.
    pub async fn infer_table(&self, session: &dyn FlowStoreSession, table: &str) -> Result<FlowSchema> {
        validate_table_identifier(table)?;
        session.list_columns(table).await
    }

    /// Result columns of a raw query.
    pub async fn infer_query(&self, session: &dyn FlowStoreSession, sql: &str) -> Result<FlowSchema> {
        session.describe_query(sql).await
    }

    /// First `preview_rows` rows of a table, restricted to `projection` when given.
    pub async fn preview_table(
        &self,
        session: &dyn FlowStoreSession,
        table: &str,
        projection: Option<&FlowProjection>,
    ) -> Result<FlowPreview> {
        let schema = self.infer_table(session, table).await?;
        let projection = match projection {
            Some(projection) => projection.clone(),
            None => FlowProjection::all(&schema),
        };
        let schema = schema.project(&projection)?;
        let sql = select_columns_sql(table, &projection, Some(self.preview_rows));
        let rows: Vec<FlowRow> = session.query(&sql).await?.try_collect().await?;
        Ok(FlowPreview { schema, rows })
    }
}
