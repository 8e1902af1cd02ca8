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

//! # ClickHouse HTTP Connector
//!
//! Talks to ClickHouse over its HTTP interface. Catalog lookups read
//! `system.tables` and `system.columns`; reads and inserts use the
//! `JSONEachRow` format so rows stream line by line.
//!
//! Authentication is either HTTP basic (user and password) or a bearer
//! token (JWT credential, as used by ClickHouse Cloud).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoint::{validate_table_identifier, FlowStoreEndpoint};
use crate::errors::{FlowError, Result};
use crate::record::{FlowRow, FlowValue};
use crate::schema::{FlowColumn, FlowColumnType, FlowSchema};
use crate::store::query::{quote_identifier, quote_literal};
use crate::store::{FlowRowStream, FlowStoreConnector, FlowStoreSession};

/// How the credential is presented to the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowClickHouseAuth {
    #[default]
    Basic,
    Bearer,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connector settings. `timeout_secs` bounds connecting and each read, not
/// a whole response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowClickHouseConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub auth: FlowClickHouseAuth,
}

impl Default for FlowClickHouseConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            auth: FlowClickHouseAuth::default(),
        }
    }
}

/// Opens HTTP sessions against ClickHouse.
#[derive(Clone, Debug)]
pub struct FlowClickHouseConnector {
    client: Client,
    config: FlowClickHouseConfig,
}

impl FlowClickHouseConnector {
    pub fn new(config: FlowClickHouseConfig) -> Result<Self> {
        // Idle timeouts only: a total deadline would cut long query streams short.
        let idle = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(idle)
            .read_timeout(idle)
            .build()
            .map_err(|err| FlowError::internal(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl FlowStoreConnector for FlowClickHouseConnector {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn connect(&self, endpoint: &FlowStoreEndpoint) -> Result<Arc<dyn FlowStoreSession>> {
        endpoint.validate_connection()?;
        let scheme = if endpoint.secure { "https" } else { "http" };
        let session = FlowClickHouseSession {
            client: self.client.clone(),
            auth: self.config.auth,
            base_url: format!("{scheme}://{}:{}/", endpoint.host, endpoint.port),
            endpoint: endpoint.clone(),
        };
        debug!("pinging clickhouse at {}", endpoint.session_key());
        session
            .execute("SELECT 1", None)
            .await
            .map_err(|err| match err {
                FlowError::Io(message) => FlowError::connection(message),
                other => other,
            })?;
        Ok(Arc::new(session))
    }
}

/// Session bound to one ClickHouse database.
#[derive(Debug)]
pub struct FlowClickHouseSession {
    client: Client,
    auth: FlowClickHouseAuth,
    base_url: String,
    endpoint: FlowStoreEndpoint,
}

impl FlowClickHouseSession {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let secret = self.endpoint.credential.expose_secret();
        match self.auth {
            FlowClickHouseAuth::Basic => request.basic_auth(&self.endpoint.username, Some(secret)),
            FlowClickHouseAuth::Bearer => request.bearer_auth(secret),
        }
    }

    /// Runs `sql`; with a body, `sql` goes to the query string and the body
    /// carries the data.
    async fn execute(&self, sql: &str, body: Option<String>) -> Result<Response> {
        let mut params = vec![
            ("database", self.endpoint.database.as_str()),
            ("output_format_json_quote_64bit_integers", "0"),
        ];
        let payload = match body {
            Some(body) => {
                params.push(("query", sql));
                body
            }
            None => sql.to_string(),
        };
        let request = self.client.post(&self.base_url).query(&params).body(payload);
        let response = self.authorize(request).send().await?;
        check_status(response, &self.endpoint.username).await
    }

    async fn fetch_objects(&self, sql: &str) -> Result<Vec<Map<String, Value>>> {
        let text = self.execute(sql, None).await?.text().await?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| -> Result<Map<String, Value>> {
                match serde_json::from_str::<Value>(line)? {
                    Value::Object(object) => Ok(object),
                    other => Err(FlowError::format(format!("unexpected response row: {other}"))),
                }
            })
            .collect()
    }

    async fn fetch_columns(&self, sql: &str) -> Result<FlowSchema> {
        let columns = self
            .fetch_objects(sql)
            .await?
            .into_iter()
            .map(|object| {
                let name = object.get("name").and_then(Value::as_str).unwrap_or_default();
                let declared = object.get("type").and_then(Value::as_str).unwrap_or_default();
                FlowColumn::new(name, FlowColumnType::from_store_type(declared))
            })
            .collect();
        FlowSchema::new(columns)
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_identifier(&self.endpoint.database), quote_identifier(table))
    }
}

async fn check_status(response: Response, username: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FlowError::connection(format!(
            "authentication failed for user '{username}' ({status})"
        )));
    }
    let text = response.text().await.unwrap_or_default();
    let summary = text.lines().next().unwrap_or("").trim().to_string();
    if summary.contains("AUTHENTICATION_FAILED") || summary.contains("Authentication failed") {
        return Err(FlowError::connection(format!(
            "authentication failed for user '{username}'"
        )));
    }
    Err(FlowError::io(format!("store returned {status}: {summary}")))
}

pub(crate) fn json_to_value(value: &Value, column_type: FlowColumnType) -> FlowValue {
    match value {
        Value::Null => FlowValue::Null,
        Value::Bool(flag) => FlowValue::Integer(i64::from(*flag)),
        Value::Number(number) => match column_type {
            FlowColumnType::Float => number.as_f64().map_or(FlowValue::Null, FlowValue::Float),
            FlowColumnType::String => FlowValue::String(number.to_string()),
            _ => match number.as_i64() {
                Some(v) => FlowValue::Integer(v),
                None => number.as_f64().map_or(FlowValue::Null, FlowValue::Float),
            },
        },
        Value::String(text) => FlowValue::from_text(text, column_type),
        other => FlowValue::String(other.to_string()),
    }
}

fn parse_json_row(line: &[u8], schema: &FlowSchema) -> Result<FlowRow> {
    let object = match serde_json::from_slice::<Value>(line)? {
        Value::Object(object) => object,
        other => return Err(FlowError::format(format!("unexpected response row: {other}"))),
    };
    Ok(schema
        .columns()
        .iter()
        .map(|column| {
            let value = object
                .get(&column.name)
                .map_or(FlowValue::Null, |v| json_to_value(v, column.inferred_type));
            (column.name.clone(), value)
        })
        .collect())
}

pub(crate) fn create_table_sql(qualified: &str, schema: &FlowSchema) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|c| format!("{} Nullable({})", quote_identifier(&c.name), c.inferred_type.store_type_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {qualified} ({columns}) ENGINE = MergeTree ORDER BY tuple()")
}

pub(crate) fn insert_body(schema: &FlowSchema, rows: &[FlowRow]) -> Result<String> {
    let mut body = String::new();
    for row in rows {
        let mut object = Map::new();
        for column in schema.columns() {
            let value = row.get(&column.name).map_or(Ok(Value::Null), serde_json::to_value)?;
            object.insert(column.name.clone(), value);
        }
        body.push_str(&serde_json::to_string(&Value::Object(object))?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl FlowStoreSession for FlowClickHouseSession {
    fn endpoint(&self) -> &FlowStoreEndpoint {
        &self.endpoint
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM system.tables WHERE database = {} ORDER BY name FORMAT JSONEachRow",
            quote_literal(&self.endpoint.database)
        );
        Ok(self
            .fetch_objects(&sql)
            .await?
            .into_iter()
            .filter_map(|object| object.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<FlowSchema> {
        let sql = format!(
            "SELECT name, type FROM system.columns WHERE database = {} AND table = {} ORDER BY position FORMAT JSONEachRow",
            quote_literal(&self.endpoint.database),
            quote_literal(table)
        );
        let schema = self.fetch_columns(&sql).await?;
        if schema.is_empty() {
            return Err(FlowError::validation(format!(
                "table {}.{table} does not exist",
                self.endpoint.database
            )));
        }
        Ok(schema)
    }

    async fn describe_query(&self, sql: &str) -> Result<FlowSchema> {
        let inner = sql.trim().trim_end_matches(';');
        self.fetch_columns(&format!("DESCRIBE TABLE ({inner}) FORMAT JSONEachRow"))
            .await
    }

    async fn query(&self, sql: &str) -> Result<FlowRowStream> {
        let schema = Arc::new(self.describe_query(sql).await?);
        let inner = sql.trim().trim_end_matches(';');
        let response = self.execute(&format!("{inner} FORMAT JSONEachRow"), None).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        let rows = stream::unfold(
            (body, Vec::<u8>::new(), false),
            move |(mut body, mut buffer, mut done)| {
                let schema = Arc::clone(&schema);
                async move {
                    loop {
                        if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            if line.iter().all(u8::is_ascii_whitespace) {
                                continue;
                            }
                            return Some((parse_json_row(&line, &schema), (body, buffer, done)));
                        }
                        if done {
                            if buffer.iter().all(u8::is_ascii_whitespace) {
                                return None;
                            }
                            let line = std::mem::take(&mut buffer);
                            return Some((parse_json_row(&line, &schema), (body, buffer, done)));
                        }
                        match body.next().await {
                            Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                            Some(Err(err)) => {
                                buffer.clear();
                                return Some((Err(FlowError::from(err)), (body, buffer, true)));
                            }
                            None => done = true,
                        }
                    }
                }
            },
        );
        Ok(rows.boxed())
    }

    async fn create_table(&self, table: &str, schema: &FlowSchema) -> Result<()> {
        validate_table_identifier(table)?;
        let sql = create_table_sql(&self.qualified(table), schema);
        debug!("creating table {}.{table}", self.endpoint.database);
        self.execute(&sql, None).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, schema: &FlowSchema, rows: &[FlowRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = schema
            .columns()
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {} ({columns}) FORMAT JSONEachRow", self.qualified(table));
        self.execute(&sql, Some(insert_body(schema, rows)?)).await?;
        Ok(rows.len())
    }
}
