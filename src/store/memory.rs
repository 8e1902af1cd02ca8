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

//! # In-Memory Columnar Store
//!
//! [`FlowMemoryStore`] keeps every table as a list of Arrow chunks, one per
//! insert. It understands `SELECT <cols|*> FROM <table|(subquery)> [LIMIT n]`
//! and exposes hooks to simulate an unreachable server, a rejected
//! credential, failing inserts and slow reads or writes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arrow2::array::{Array, MutableArray, MutablePrimitiveArray, MutableUtf8Array, PrimitiveArray, Utf8Array};
use arrow2::chunk::Chunk;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use futures::stream::{self, StreamExt};

use crate::endpoint::{validate_table_identifier, FlowCredential, FlowStoreEndpoint};
use crate::errors::{FlowError, Result};
use crate::record::{FlowRow, FlowValue};
use crate::schema::{FlowColumn, FlowColumnType, FlowProjection, FlowSchema};
use crate::store::query::{parse_simple_select, FlowSelectFrom};
use crate::store::{FlowRowStream, FlowStoreConnector, FlowStoreSession};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

type FlowArrowChunk = Chunk<Arc<dyn Array>>;

#[derive(Clone)]
struct FlowMemoryTable {
    schema: FlowSchema,
    chunks: Vec<FlowArrowChunk>,
}

#[derive(Clone, Debug, Default)]
struct FlowMemoryFaults {
    unreachable: bool,
    fail_inserts_after: Option<usize>,
    row_delay: Option<Duration>,
    insert_delay: Option<Duration>,
}

#[derive(Default)]
struct FlowMemoryInner {
    databases: Mutex<HashMap<String, BTreeMap<String, FlowMemoryTable>>>,
    credentials: Mutex<Option<(String, FlowCredential)>>,
    faults: Mutex<FlowMemoryFaults>,
    insert_calls: AtomicUsize,
    connects: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Arrow-backed store living in the current process.
#[derive(Clone)]
pub struct FlowMemoryStore {
    inner: Arc<FlowMemoryInner>,
}

impl fmt::Debug for FlowMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let databases: Vec<String> = lock(&self.inner.databases).keys().cloned().collect();
        f.debug_struct("FlowMemoryStore")
            .field("databases", &databases)
            .field("insert_calls", &self.insert_calls())
            .finish_non_exhaustive()
    }
}

impl Default for FlowMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowMemoryStore {
    /// Empty store with a `default` database and no credential check.
    pub fn new() -> Self {
        let store = Self {
            inner: Arc::new(FlowMemoryInner::default()),
        };
        store.create_database("default");
        store
    }

    /// Accept only this user and secret on connect.
    pub fn with_credentials(self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        *lock(&self.inner.credentials) = Some((username.into(), FlowCredential::new(secret)));
        self
    }

    pub fn create_database(&self, name: impl Into<String>) {
        lock(&self.inner.databases).entry(name.into()).or_default();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.inner.faults).unreachable = unreachable;
    }

    /// Inserts fail once `calls` inserts have succeeded.
    pub fn fail_inserts_after(&self, calls: Option<usize>) {
        lock(&self.inner.faults).fail_inserts_after = calls;
    }

    /// Delay before each streamed row.
    pub fn set_row_delay(&self, delay: Option<Duration>) {
        lock(&self.inner.faults).row_delay = delay;
    }

    /// Delay inside each insert, before the chunk is stored.
    pub fn set_insert_delay(&self, delay: Option<Duration>) {
        lock(&self.inner.faults).insert_delay = delay;
    }

    pub fn insert_calls(&self) -> usize {
        self.inner.insert_calls.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Creates (or replaces) a table and fills it with `rows`.
    pub fn seed_table(&self, database: &str, table: &str, schema: FlowSchema, rows: &[FlowRow]) -> Result<()> {
        validate_table_identifier(table)?;
        let schema = storage_schema(&schema);
        let mut chunks = Vec::new();
        if !rows.is_empty() {
            chunks.push(build_chunk(&schema, rows)?);
        }
        let mut databases = lock(&self.inner.databases);
        databases
            .entry(database.to_string())
            .or_default()
            .insert(table.to_string(), FlowMemoryTable { schema, chunks });
        Ok(())
    }

    pub fn has_table(&self, database: &str, table: &str) -> bool {
        lock(&self.inner.databases)
            .get(database)
            .map_or(false, |tables| tables.contains_key(table))
    }

    pub fn table_schema(&self, database: &str, table: &str) -> Option<FlowSchema> {
        self.snapshot(database, table).map(|t| t.schema)
    }

    /// Every stored row of a table, in insert order.
    pub fn table_rows(&self, database: &str, table: &str) -> Result<Vec<FlowRow>> {
        let snapshot = self
            .snapshot(database, table)
            .ok_or_else(|| missing_table(database, table))?;
        let mut rows = Vec::new();
        for chunk in &snapshot.chunks {
            rows.extend(decode_chunk(&snapshot.schema, chunk)?);
        }
        Ok(rows)
    }

    pub fn row_count(&self, database: &str, table: &str) -> usize {
        self.snapshot(database, table)
            .map_or(0, |t| t.chunks.iter().map(|c| c.len()).sum())
    }

    fn snapshot(&self, database: &str, table: &str) -> Option<FlowMemoryTable> {
        lock(&self.inner.databases)
            .get(database)
            .and_then(|tables| tables.get(table))
            .cloned()
    }

    fn faults(&self) -> FlowMemoryFaults {
        lock(&self.inner.faults).clone()
    }

    /// Resolves a simple select into its result schema and a lazy row iterator.
    fn resolve(
        &self,
        database: &str,
        sql: &str,
    ) -> Result<(FlowSchema, Box<dyn Iterator<Item = Result<FlowRow>> + Send>)> {
        let select = parse_simple_select(sql)?;
        let (schema, rows): (FlowSchema, Box<dyn Iterator<Item = Result<FlowRow>> + Send>) = match select.from {
            FlowSelectFrom::Table(table) => {
                let snapshot = self
                    .snapshot(database, &table)
                    .ok_or_else(|| missing_table(database, &table))?;
                let schema = snapshot.schema.clone();
                let decode_schema = snapshot.schema;
                let rows = snapshot.chunks.into_iter().flat_map(move |chunk| {
                    match decode_chunk(&decode_schema, &chunk) {
                        Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                        Err(err) => vec![Err(err)],
                    }
                });
                (schema, Box::new(rows))
            }
            FlowSelectFrom::Subquery(inner) => self.resolve(database, &inner)?,
        };

        let (schema, rows) = match select.columns {
            None => (schema, rows),
            Some(columns) => {
                let projection = FlowProjection::new(columns);
                let projected = schema.project(&projection)?;
                let rows: Box<dyn Iterator<Item = Result<FlowRow>> + Send> =
                    Box::new(rows.map(move |row| row.map(|r| r.project(&projection))));
                (projected, rows)
            }
        };

        match select.limit {
            Some(limit) => Ok((schema, Box::new(rows.take(limit)))),
            None => Ok((schema, rows)),
        }
    }
}

fn missing_table(database: &str, table: &str) -> FlowError {
    FlowError::validation(format!("table {database}.{table} does not exist"))
}

/// Stored columns always carry a concrete type.
fn storage_schema(schema: &FlowSchema) -> FlowSchema {
    let columns = schema
        .columns()
        .iter()
        .map(|c| match c.inferred_type {
            FlowColumnType::Unknown => FlowColumn::new(c.name.clone(), FlowColumnType::String),
            other => FlowColumn::new(c.name.clone(), other),
        })
        .collect();
    // Names were unique in the input schema.
    FlowSchema::new(columns).unwrap_or_else(|_| schema.clone())
}

fn type_error(column: &str, expected: FlowColumnType, value: &FlowValue) -> FlowError {
    FlowError::io(format!(
        "cannot store {} value '{}' in {} column '{column}'",
        value.column_type().as_str(),
        value.as_text(),
        expected.as_str()
    ))
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

fn build_column(column: &FlowColumn, rows: &[FlowRow]) -> Result<Arc<dyn Array>> {
    let name = column.name.as_str();
    let values = rows.iter().map(|row| row.get(name));
    match column.inferred_type {
        FlowColumnType::Integer => {
            let mut array = MutablePrimitiveArray::<i64>::with_capacity(rows.len());
            for value in values {
                match value {
                    None | Some(FlowValue::Null) => array.push(None),
                    Some(FlowValue::Integer(v)) => array.push(Some(*v)),
                    Some(other) => return Err(type_error(name, FlowColumnType::Integer, other)),
                }
            }
            Ok(array.as_arc())
        }
        FlowColumnType::Float => {
            let mut array = MutablePrimitiveArray::<f64>::with_capacity(rows.len());
            for value in values {
                match value {
                    None | Some(FlowValue::Null) => array.push(None),
                    Some(FlowValue::Float(v)) => array.push(Some(*v)),
                    Some(FlowValue::Integer(v)) => array.push(Some(*v as f64)),
                    Some(other) => return Err(type_error(name, FlowColumnType::Float, other)),
                }
            }
            Ok(array.as_arc())
        }
        FlowColumnType::Date => {
            let mut array = MutablePrimitiveArray::<i32>::with_capacity(rows.len());
            for value in values {
                match value {
                    None | Some(FlowValue::Null) => array.push(None),
                    Some(FlowValue::Date(d)) => array.push(Some(date_to_days(*d))),
                    Some(other) => return Err(type_error(name, FlowColumnType::Date, other)),
                }
            }
            Ok(array.as_arc())
        }
        FlowColumnType::String | FlowColumnType::Unknown => {
            let mut array = MutableUtf8Array::<i32>::with_capacity(rows.len());
            for value in values {
                match value {
                    None | Some(FlowValue::Null) => array.push_null(),
                    Some(other) => array.push(Some(other.as_text().as_ref())),
                }
            }
            Ok(array.as_arc())
        }
    }
}

fn build_chunk(schema: &FlowSchema, rows: &[FlowRow]) -> Result<FlowArrowChunk> {
    let arrays = schema
        .columns()
        .iter()
        .map(|column| build_column(column, rows))
        .collect::<Result<Vec<_>>>()?;
    Ok(Chunk::try_new(arrays)?)
}

fn downcast<'a, T: 'static>(array: &'a Arc<dyn Array>, column: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| FlowError::internal(format!("column '{column}' has an unexpected array type")))
}

fn decode_chunk(schema: &FlowSchema, chunk: &FlowArrowChunk) -> Result<Vec<FlowRow>> {
    let mut rows = vec![FlowRow::new(); chunk.len()];
    for (column, array) in schema.columns().iter().zip(chunk.arrays()) {
        let name = column.name.as_str();
        match column.inferred_type {
            FlowColumnType::Integer => {
                let array = downcast::<PrimitiveArray<i64>>(array, name)?;
                for (index, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(index) {
                        FlowValue::Null
                    } else {
                        FlowValue::Integer(array.value(index))
                    };
                    row.insert(name, value);
                }
            }
            FlowColumnType::Float => {
                let array = downcast::<PrimitiveArray<f64>>(array, name)?;
                for (index, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(index) {
                        FlowValue::Null
                    } else {
                        FlowValue::Float(array.value(index))
                    };
                    row.insert(name, value);
                }
            }
            FlowColumnType::Date => {
                let array = downcast::<PrimitiveArray<i32>>(array, name)?;
                for (index, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(index) {
                        FlowValue::Null
                    } else {
                        days_to_date(array.value(index)).map_or(FlowValue::Null, FlowValue::Date)
                    };
                    row.insert(name, value);
                }
            }
            FlowColumnType::String | FlowColumnType::Unknown => {
                let array = downcast::<Utf8Array<i32>>(array, name)?;
                for (index, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(index) {
                        FlowValue::Null
                    } else {
                        FlowValue::String(array.value(index).to_string())
                    };
                    row.insert(name, value);
                }
            }
        }
    }
    Ok(rows)
}

#[async_trait]
impl FlowStoreConnector for FlowMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, endpoint: &FlowStoreEndpoint) -> Result<Arc<dyn FlowStoreSession>> {
        endpoint.validate_connection()?;
        if self.faults().unreachable {
            return Err(FlowError::connection(format!(
                "store at {}:{} is unreachable",
                endpoint.host, endpoint.port
            )));
        }
        if let Some((username, credential)) = lock(&self.inner.credentials).as_ref() {
            if *username != endpoint.username || *credential != endpoint.credential {
                return Err(FlowError::connection(format!(
                    "authentication failed for user '{}'",
                    endpoint.username
                )));
            }
        }
        if !lock(&self.inner.databases).contains_key(&endpoint.database) {
            return Err(FlowError::connection(format!(
                "database '{}' does not exist",
                endpoint.database
            )));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FlowMemorySession {
            store: self.clone(),
            endpoint: endpoint.clone(),
        }))
    }
}

/// Session bound to one database of a [`FlowMemoryStore`].
#[derive(Debug)]
pub struct FlowMemorySession {
    store: FlowMemoryStore,
    endpoint: FlowStoreEndpoint,
}

impl FlowMemorySession {
    fn database(&self) -> &str {
        &self.endpoint.database
    }
}

#[async_trait]
impl FlowStoreSession for FlowMemorySession {
    fn endpoint(&self) -> &FlowStoreEndpoint {
        &self.endpoint
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let databases = lock(&self.store.inner.databases);
        let tables = databases
            .get(self.database())
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default();
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<FlowSchema> {
        self.store
            .table_schema(self.database(), table)
            .ok_or_else(|| missing_table(self.database(), table))
    }

    async fn describe_query(&self, sql: &str) -> Result<FlowSchema> {
        let (schema, _) = self.store.resolve(self.database(), sql)?;
        Ok(schema)
    }

    async fn query(&self, sql: &str) -> Result<FlowRowStream> {
        let (_, rows) = self.store.resolve(self.database(), sql)?;
        let delay = self.store.faults().row_delay;
        let stream = stream::iter(rows).then(move |row| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            row
        });
        Ok(stream.boxed())
    }

    async fn create_table(&self, table: &str, schema: &FlowSchema) -> Result<()> {
        validate_table_identifier(table)?;
        let mut databases = lock(&self.store.inner.databases);
        let tables = databases.entry(self.database().to_string()).or_default();
        tables.entry(table.to_string()).or_insert_with(|| FlowMemoryTable {
            schema: storage_schema(schema),
            chunks: Vec::new(),
        });
        Ok(())
    }

    async fn insert(&self, table: &str, schema: &FlowSchema, rows: &[FlowRow]) -> Result<usize> {
        let faults = self.store.faults();
        let calls = self.store.inner.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = faults.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_inserts_after.map_or(false, |limit| calls >= limit) {
            return Err(FlowError::io(format!(
                "insert into {}.{table} failed: connection reset by peer",
                self.database()
            )));
        }

        let snapshot = self
            .store
            .snapshot(self.database(), table)
            .ok_or_else(|| FlowError::io(format!("table {}.{table} does not exist", self.database())))?;
        if let Some(column) = schema.columns().iter().find(|c| !snapshot.schema.contains(&c.name)) {
            return Err(FlowError::schema_mismatch(format!(
                "column '{}' does not exist in {}.{table}",
                column.name,
                self.database()
            )));
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let chunk = build_chunk(&snapshot.schema, rows)?;
        let written = chunk.len();
        let mut databases = lock(&self.store.inner.databases);
        let stored = databases
            .get_mut(self.database())
            .and_then(|tables| tables.get_mut(table))
            .ok_or_else(|| FlowError::io(format!("table {}.{table} was dropped", self.database())))?;
        stored.chunks.push(chunk);
        Ok(written)
    }
}
