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

//! # FileFlow Store Module
//!
//! The columnar store is reached through two traits: a
//! [`FlowStoreConnector`] opens a [`FlowStoreSession`] for an endpoint, and
//! the session answers catalog lookups, streams query results and accepts
//! bounded inserts.
//!
//! ## Implementations
//!
//! - [`memory::FlowMemoryStore`]: in-process Arrow-backed store
//! - [`clickhouse::FlowClickHouseConnector`]: ClickHouse HTTP interface
//!   (`clickhouse` feature)

pub mod memory;
pub mod query;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::endpoint::FlowStoreEndpoint;
use crate::errors::Result;
use crate::record::FlowRow;
use crate::schema::FlowSchema;

/// Lazy, finite stream of rows.
pub type FlowRowStream = BoxStream<'static, Result<FlowRow>>;

/// Opens sessions against a store.
#[async_trait]
pub trait FlowStoreConnector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Connects and verifies the credential.
    async fn connect(&self, endpoint: &FlowStoreEndpoint) -> Result<Arc<dyn FlowStoreSession>>;
}

/// A live connection to one database of a store.
#[async_trait]
pub trait FlowStoreSession: Send + Sync {
    fn endpoint(&self) -> &FlowStoreEndpoint;

    /// Table names of the session's database.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` with types mapped from the declared store types.
    async fn list_columns(&self, table: &str) -> Result<FlowSchema>;

    /// Result columns of a query, without running it to completion.
    async fn describe_query(&self, sql: &str) -> Result<FlowSchema>;

    /// Streams the rows a query returns.
    async fn query(&self, sql: &str) -> Result<FlowRowStream>;

    /// Creates `table` with nullable columns for `schema` if it does not exist.
    async fn create_table(&self, table: &str, schema: &FlowSchema) -> Result<()>;

    /// Inserts one bounded chunk, returning the number of rows written.
    async fn insert(&self, table: &str, schema: &FlowSchema, rows: &[FlowRow]) -> Result<usize>;
}

pub use memory::FlowMemoryStore;
pub use query::FlowJoinQueryBuilder;

#[cfg(feature = "clickhouse")]
pub use clickhouse::{FlowClickHouseAuth, FlowClickHouseConfig, FlowClickHouseConnector};
