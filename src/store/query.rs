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

//! SQL text helpers shared by the store implementations.

use std::sync::OnceLock;

use regex::Regex;

use crate::endpoint::validate_table_identifier;
use crate::errors::{FlowError, Result};
use crate::schema::FlowProjection;

/// Backtick-quotes an identifier.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{escaped}`")
}

/// Single-quotes a string literal.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn column_list(projection: &FlowProjection) -> String {
    projection
        .columns()
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT <projection> FROM <table> [LIMIT n]`.
pub fn select_columns_sql(table: &str, projection: &FlowProjection, limit: Option<usize>) -> String {
    let mut sql = format!("SELECT {} FROM {}", column_list(projection), quote_identifier(table));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}

/// Restricts an arbitrary query to the projected columns.
pub fn wrap_projection(sql: &str, projection: &FlowProjection) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT {} FROM ({inner})", column_list(projection))
}

/// Builds `SELECT * FROM t1, t2 ... WHERE <condition>` for a query source.
#[derive(Clone, Debug, Default)]
pub struct FlowJoinQueryBuilder {
    tables: Vec<String>,
    condition: String,
}

impl FlowJoinQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub fn tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn build(&self) -> Result<String> {
        let mut distinct: Vec<&str> = Vec::new();
        for table in &self.tables {
            let table = table.trim();
            validate_table_identifier(table)?;
            if !distinct.contains(&table) {
                distinct.push(table);
            }
        }
        if distinct.len() < 2 {
            return Err(FlowError::validation("a join needs at least two distinct tables"));
        }
        let condition = self.condition.trim();
        if condition.is_empty() {
            return Err(FlowError::validation("a join needs a condition"));
        }
        Ok(format!("SELECT * FROM {} WHERE {condition}", distinct.join(", ")))
    }
}

/// Parsed form of the simple selects the memory store understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FlowSimpleSelect {
    /// `None` selects every column.
    pub columns: Option<Vec<String>>,
    pub from: FlowSelectFrom,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FlowSelectFrom {
    Table(String),
    Subquery(String),
}

fn simple_select_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*SELECT\s+(?P<cols>.+?)\s+FROM\s+(?P<from>\(.+\)|[^\s;]+)(?:\s+LIMIT\s+(?P<limit>\d+))?\s*;?\s*$")
            .expect("static select pattern")
    })
}

fn unquote_identifier(token: &str) -> String {
    let token = token.trim();
    let unwrapped = token
        .strip_prefix('`')
        .and_then(|t| t.strip_suffix('`'))
        .or_else(|| token.strip_prefix('"').and_then(|t| t.strip_suffix('"')));
    match unwrapped {
        Some(inner) => inner.replace("\\`", "`").replace("\\\\", "\\"),
        None => token.to_string(),
    }
}

pub(crate) fn parse_simple_select(sql: &str) -> Result<FlowSimpleSelect> {
    let captures = simple_select_pattern()
        .captures(sql)
        .ok_or_else(|| FlowError::validation(format!("unsupported query: {}", sql.trim())))?;

    let cols = captures.name("cols").map_or("", |m| m.as_str()).trim();
    let columns = if cols == "*" {
        None
    } else {
        Some(cols.split(',').map(unquote_identifier).collect())
    };

    let from = captures.name("from").map_or("", |m| m.as_str()).trim();
    let from = match from.strip_prefix('(').and_then(|f| f.strip_suffix(')')) {
        Some(inner) => FlowSelectFrom::Subquery(inner.trim().to_string()),
        None => {
            let name = unquote_identifier(from);
            let name = name.rsplit('.').next().unwrap_or(&name).to_string();
            FlowSelectFrom::Table(name)
        }
    };

    let limit = match captures.name("limit") {
        Some(m) => Some(
            m.as_str()
                .parse::<usize>()
                .map_err(|err| FlowError::validation(format!("invalid limit: {err}")))?,
        ),
        None => None,
    };

    Ok(FlowSimpleSelect { columns, from, limit })
}
