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

//! # FileFlow Schema Module
//!
//! Column definitions and projections shared by both sides of a transfer.
//!
//! A [`FlowSchema`] is an ordered list of uniquely named columns carrying a
//! coarse type hint. A [`FlowProjection`] is the caller's ordered choice of
//! columns from a schema; output columns always follow projection order.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{FlowError, Result};
use crate::record::DATE_FORMAT;

/// Coarse type hint attached to a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowColumnType {
    String,
    Integer,
    Float,
    Date,
    Unknown,
}

impl Default for FlowColumnType {
    fn default() -> Self {
        FlowColumnType::Unknown
    }
}

impl FlowColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowColumnType::String => "string",
            FlowColumnType::Integer => "integer",
            FlowColumnType::Float => "float",
            FlowColumnType::Date => "date",
            FlowColumnType::Unknown => "unknown",
        }
    }

    /// Classifies one delimited text value: integer, then float, then date,
    /// else string. Empty text carries no evidence.
    pub fn infer_text(text: &str) -> FlowColumnType {
        let text = text.trim();
        if text.is_empty() {
            return FlowColumnType::Unknown;
        }
        if text.parse::<i64>().is_ok() {
            return FlowColumnType::Integer;
        }
        if text.chars().any(|c| c.is_ascii_digit()) && text.parse::<f64>().is_ok() {
            return FlowColumnType::Float;
        }
        if NaiveDate::parse_from_str(text, DATE_FORMAT).is_ok() {
            return FlowColumnType::Date;
        }
        FlowColumnType::String
    }

    /// Combines evidence from two samples of the same column.
    pub fn merge(self, other: FlowColumnType) -> FlowColumnType {
        use FlowColumnType::*;
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => String,
        }
    }

    /// Maps a store's declared column type to a type hint.
    pub fn from_store_type(declared: &str) -> FlowColumnType {
        let mut ty = declared.trim();
        loop {
            let inner = ["Nullable(", "LowCardinality("]
                .iter()
                .find_map(|wrapper| ty.strip_prefix(wrapper).and_then(|rest| rest.strip_suffix(')')));
            match inner {
                Some(inner) => ty = inner.trim(),
                None => break,
            }
        }

        if ty.starts_with("Int") || ty.starts_with("UInt") {
            FlowColumnType::Integer
        } else if ty.starts_with("Float") || ty.starts_with("Decimal") {
            FlowColumnType::Float
        } else if ty == "Date" || ty == "Date32" {
            FlowColumnType::Date
        } else if ty == "String"
            || ty.starts_with("FixedString")
            || ty == "UUID"
            || ty.starts_with("Enum")
            || ty.starts_with("DateTime")
        {
            FlowColumnType::String
        } else {
            FlowColumnType::Unknown
        }
    }

    /// Store column type used when creating a table for this hint.
    pub fn store_type_name(&self) -> &'static str {
        match self {
            FlowColumnType::Integer => "Int64",
            FlowColumnType::Float => "Float64",
            FlowColumnType::Date => "Date",
            FlowColumnType::String | FlowColumnType::Unknown => "String",
        }
    }

    /// Equal types are compatible, and `unknown` is compatible with anything.
    pub fn is_compatible_with(&self, other: FlowColumnType) -> bool {
        *self == other || *self == FlowColumnType::Unknown || other == FlowColumnType::Unknown
    }
}

/// A named column with its inferred type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowColumn {
    pub name: String,
    #[serde(default)]
    pub inferred_type: FlowColumnType,
}

impl FlowColumn {
    pub fn new(name: impl Into<String>, inferred_type: FlowColumnType) -> Self {
        Self {
            name: name.into(),
            inferred_type,
        }
    }
}

/// Ordered list of uniquely named columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSchema {
    columns: Vec<FlowColumn>,
}

impl FlowSchema {
    /// Builds a schema, rejecting empty or duplicate column names.
    pub fn new(columns: Vec<FlowColumn>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(FlowError::validation("column names must not be empty"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(FlowError::validation(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[FlowColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&FlowColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn type_of(&self, name: &str) -> FlowColumnType {
        self.column(name)
            .map(|c| c.inferred_type)
            .unwrap_or(FlowColumnType::Unknown)
    }

    /// Sub-schema in projection order. Fails when a projected column is absent.
    pub fn project(&self, projection: &FlowProjection) -> Result<FlowSchema> {
        projection.validate_against(self)?;
        let columns = projection
            .columns()
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        Ok(FlowSchema { columns })
    }
}

/// Ordered, de-duplicated selection of column names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FlowProjection {
    columns: Vec<String>,
}

impl FlowProjection {
    /// Keeps the first occurrence of each name.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for column in columns {
            let column = column.into();
            if seen.insert(column.clone()) {
                ordered.push(column);
            }
        }
        Self { columns: ordered }
    }

    /// Every column of `schema`, in schema order.
    pub fn all(schema: &FlowSchema) -> Self {
        Self {
            columns: schema.names(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Every projected column must exist in `schema`.
    pub fn validate_against(&self, schema: &FlowSchema) -> Result<()> {
        if self.columns.is_empty() {
            return Err(FlowError::validation("at least one column must be selected"));
        }
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !schema.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(FlowError::validation(format!(
                "selected columns not found in source: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

impl From<Vec<String>> for FlowProjection {
    fn from(columns: Vec<String>) -> Self {
        FlowProjection::new(columns)
    }
}

impl From<FlowProjection> for Vec<String> {
    fn from(projection: FlowProjection) -> Self {
        projection.columns
    }
}
