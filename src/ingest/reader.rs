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

//! # Source Readers
//!
//! A [`FlowSourceReader`] yields a fresh, finite row stream restricted to a
//! projection each time `rows` is called. Rows come back in natural source
//! order and carry exactly the projected columns.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::debug;

use crate::codec::FlowDelimitedCodec;
use crate::endpoint::FlowFileEndpoint;
use crate::errors::{FlowError, Result};
use crate::ingest::inference::FlowSchemaInferencer;
use crate::schema::{FlowProjection, FlowSchema};
use crate::store::query::{select_columns_sql, wrap_projection};
use crate::store::{FlowRowStream, FlowStoreSession};

/// Polymorphic row source.
#[async_trait]
pub trait FlowSourceReader: Send + Sync {
    /// Name used in status messages.
    fn describe(&self) -> String;

    /// Full schema of the source.
    async fn schema(&self) -> Result<FlowSchema>;

    /// Lazy stream of projected rows; every call starts from the beginning.
    async fn rows(&self, projection: &FlowProjection) -> Result<FlowRowStream>;
}

/// Reads rows from a delimited file.
#[derive(Clone, Debug)]
pub struct FlowFileSource {
    file: FlowFileEndpoint,
    inferencer: FlowSchemaInferencer,
    schema: Option<FlowSchema>,
}

impl FlowFileSource {
    pub fn new(file: FlowFileEndpoint) -> Self {
        Self {
            file,
            inferencer: FlowSchemaInferencer::default(),
            schema: None,
        }
    }

    pub fn with_inferencer(mut self, inferencer: FlowSchemaInferencer) -> Self {
        self.inferencer = inferencer;
        self
    }

    /// Uses an already inferred schema instead of sampling again.
    pub fn with_schema(mut self, schema: FlowSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
impl FlowSourceReader for FlowFileSource {
    fn describe(&self) -> String {
        self.file.handle.name()
    }

    async fn schema(&self) -> Result<FlowSchema> {
        match &self.schema {
            Some(schema) => Ok(schema.clone()),
            None => self.inferencer.infer_from_file(&self.file),
        }
    }

    async fn rows(&self, projection: &FlowProjection) -> Result<FlowRowStream> {
        let schema = self.schema().await?;
        projection.validate_against(&schema)?;

        let codec = FlowDelimitedCodec::for_file(&self.file)?;
        let reader = self.file.handle.open_read()?;
        let (_, rows) = codec.parse_reader(reader)?;
        let projection = projection.clone();
        let rows = rows
            .with_types(&schema)
            .map(move |row| row.map(|r| r.project(&projection)));
        debug!("streaming rows from {}", self.describe());
        Ok(stream::iter(rows).boxed())
    }
}

/// What a store source reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowStoreTarget {
    Table(String),
    Query(String),
}

/// Reads rows from a store table or from the result of a raw query.
#[derive(Clone)]
pub struct FlowStoreSource {
    session: Arc<dyn FlowStoreSession>,
    target: FlowStoreTarget,
    schema: Option<FlowSchema>,
}

impl FlowStoreSource {
    pub fn table(session: Arc<dyn FlowStoreSession>, table: impl Into<String>) -> Self {
        Self {
            session,
            target: FlowStoreTarget::Table(table.into()),
            schema: None,
        }
    }

    pub fn query(session: Arc<dyn FlowStoreSession>, sql: impl Into<String>) -> Self {
        Self {
            session,
            target: FlowStoreTarget::Query(sql.into()),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: FlowSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn target(&self) -> &FlowStoreTarget {
        &self.target
    }
}

#[async_trait]
impl FlowSourceReader for FlowStoreSource {
    fn describe(&self) -> String {
        let database = &self.session.endpoint().database;
        match &self.target {
            FlowStoreTarget::Table(table) => format!("{database}.{table}"),
            FlowStoreTarget::Query(_) => format!("query on {database}"),
        }
    }

    async fn schema(&self) -> Result<FlowSchema> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        match &self.target {
            FlowStoreTarget::Table(table) => self.session.list_columns(table).await,
            FlowStoreTarget::Query(sql) => self.session.describe_query(sql).await,
        }
    }

    async fn rows(&self, projection: &FlowProjection) -> Result<FlowRowStream> {
        let schema = self.schema().await?;
        projection.validate_against(&schema)?;

        let sql = match &self.target {
            FlowStoreTarget::Table(table) => select_columns_sql(table, projection, None),
            FlowStoreTarget::Query(sql) if sql.trim().is_empty() => {
                return Err(FlowError::validation("query text is required"))
            }
            FlowStoreTarget::Query(sql) => wrap_projection(sql, projection),
        };
        debug!("streaming rows from {}", self.describe());
        let projection = projection.clone();
        let rows = self
            .session
            .query(&sql)
            .await?
            .map(move |row| row.map(|r| r.project(&projection)));
        Ok(rows.boxed())
    }
}
